//! Tier relationship graph
//!
//! Tiers of one exercise are linked by two independent self references:
//!
//! ```text
//!   parent_tier (sync)              special_parent_tier (one-directional)
//!
//!        word                              phrase
//!       /    \                               |
//!   syllable  note                        phrase_detail
//!                                            |
//!                                         phrase_note
//! ```
//!
//! Edits propagate symmetrically across a sync component and
//! asymmetrically along special links. The graph is an arena keyed by tier
//! id; every traversal tracks visited ids so an accidental cycle in stored
//! data cannot recurse forever. [`TierGraph::check_acyclic`] reports such
//! cycles as [`Error::Integrity`].

use crate::db::models::Tier;
use crate::db::tiers;
use crate::{Error, Result};
use sqlx::SqliteConnection;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Default)]
struct TierNode {
    parent: Option<i64>,
    special_parent: Option<i64>,
    children: Vec<i64>,
    special_children: Vec<i64>,
}

/// Adjacency of every tier in one exercise
#[derive(Debug, Clone, Default)]
pub struct TierGraph {
    nodes: HashMap<i64, TierNode>,
}

impl TierGraph {
    pub fn from_tiers<'a>(tiers: impl IntoIterator<Item = &'a Tier>) -> Self {
        let mut nodes: HashMap<i64, TierNode> = HashMap::new();
        for tier in tiers {
            let node = nodes.entry(tier.id).or_default();
            node.parent = tier.parent_tier_id;
            node.special_parent = tier.special_parent_tier_id;
        }

        // Edges to tiers outside the loaded set are kept on the child only
        let links: Vec<(i64, Option<i64>, Option<i64>)> = nodes
            .iter()
            .map(|(id, node)| (*id, node.parent, node.special_parent))
            .collect();
        for (id, parent, special_parent) in links {
            if let Some(node) = parent.and_then(|p| nodes.get_mut(&p)) {
                node.children.push(id);
            }
            if let Some(node) = special_parent.and_then(|p| nodes.get_mut(&p)) {
                node.special_children.push(id);
            }
        }
        for node in nodes.values_mut() {
            node.children.sort_unstable();
            node.special_children.sort_unstable();
        }

        Self { nodes }
    }

    /// Load the graph for every tier of an exercise
    pub async fn load(conn: &mut SqliteConnection, exercise_id: i64) -> Result<Self> {
        let tiers = tiers::list_tiers_for_exercise(conn, exercise_id).await?;
        Ok(Self::from_tiers(&tiers))
    }

    pub fn contains(&self, tier_id: i64) -> bool {
        self.nodes.contains_key(&tier_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Declared hierarchical children, without descending further
    pub fn direct_children(&self, tier_id: i64) -> &[i64] {
        self.nodes
            .get(&tier_id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// All hierarchical descendants
    pub fn child_tiers(&self, tier_id: i64) -> BTreeSet<i64> {
        self.descendants(tier_id, |n| &n.children)
    }

    /// All special descendants
    pub fn special_child_tiers(&self, tier_id: i64) -> BTreeSet<i64> {
        self.descendants(tier_id, |n| &n.special_children)
    }

    /// All special ancestors, nearest first in id order
    pub fn special_parent_tiers(&self, tier_id: i64) -> BTreeSet<i64> {
        self.ancestors(tier_id, |n| n.special_parent)
    }

    /// All hierarchical ancestors
    pub fn parent_tiers(&self, tier_id: i64) -> BTreeSet<i64> {
        self.ancestors(tier_id, |n| n.parent)
    }

    /// Every other tier in the sync component: ancestors, their
    /// descendants, and the tier's own descendants
    pub fn sync_tiers(&self, tier_id: i64) -> BTreeSet<i64> {
        let mut roots = self.parent_tiers(tier_id);
        roots.insert(tier_id);

        let mut result = BTreeSet::new();
        for root in &roots {
            result.insert(*root);
            result.extend(self.child_tiers(*root));
        }
        result.remove(&tier_id);
        result
    }

    /// Fail on a cycle through either relation or a link to an unknown tier
    pub fn check_acyclic(&self) -> Result<()> {
        for (&id, node) in &self.nodes {
            for (relation, link) in [("parent", node.parent), ("special parent", node.special_parent)] {
                if let Some(target) = link {
                    if !self.nodes.contains_key(&target) {
                        return Err(Error::Integrity(format!(
                            "tier {} has {} tier {} outside its exercise",
                            id, relation, target
                        )));
                    }
                }
            }
            if self.follows_back(id, |n| n.parent) {
                return Err(Error::Integrity(format!("tier {} is its own parent tier ancestor", id)));
            }
            if self.follows_back(id, |n| n.special_parent) {
                return Err(Error::Integrity(format!(
                    "tier {} is its own special parent tier ancestor",
                    id
                )));
            }
        }
        Ok(())
    }

    fn follows_back(&self, start: i64, next: impl Fn(&TierNode) -> Option<i64>) -> bool {
        let mut visited = HashSet::new();
        let mut current = self.nodes.get(&start).and_then(&next);
        while let Some(id) = current {
            if id == start {
                return true;
            }
            if !visited.insert(id) {
                // Cycle further up that does not pass through `start`
                return false;
            }
            current = self.nodes.get(&id).and_then(&next);
        }
        false
    }

    fn descendants(&self, start: i64, edges: impl Fn(&TierNode) -> &Vec<i64>) -> BTreeSet<i64> {
        let mut visited = BTreeSet::new();
        let mut stack: Vec<i64> = self
            .nodes
            .get(&start)
            .map(|n| edges(n).clone())
            .unwrap_or_default();

        while let Some(id) = stack.pop() {
            if id == start || !visited.insert(id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(edges(node).iter().copied());
            }
        }
        visited
    }

    fn ancestors(&self, start: i64, next: impl Fn(&TierNode) -> Option<i64>) -> BTreeSet<i64> {
        let mut visited = BTreeSet::new();
        let mut current = self.nodes.get(&start).and_then(&next);
        while let Some(id) = current {
            if id == start || !self.nodes.contains_key(&id) || !visited.insert(id) {
                break;
            }
            current = self.nodes.get(&id).and_then(&next);
        }
        visited
    }
}
