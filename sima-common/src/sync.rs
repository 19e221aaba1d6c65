//! Annotation synchronization
//!
//! Reconciles the stored annotations of one (sound, tier) pair against a
//! submission from the annotation front-end and keeps related tiers in step:
//!
//! - **Sync tiers** (hierarchical `parent_tier` component): creations are
//!   copied to every other tier of the component; updates rewrite rows that
//!   share a boundary with the edited row, label included.
//! - **Special parents**: updates reach every special ancestor unless the
//!   submission still covers all of the direct special parent's boundaries.
//!   Creations never travel upward.
//! - **Special children**: creations are copied without a label; updates
//!   move endpoints that exactly matched the edited row's old endpoints.
//!
//! Stale rows are deleted, freshly added sync children are back-filled, and
//! the sound's [`AnnotationState`] is recomputed. Everything runs in one
//! transaction, so a failed call leaves no partial propagation behind and can
//! simply be retried with the same submission.

use crate::completion;
use crate::db::annotations::{self, NewAnnotation};
use crate::db::models::{Annotation, AnnotationState, Sound, Tier};
use crate::db::{similarities, sounds, tiers, users};
use crate::graph::TierGraph;
use crate::time::Seconds;
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

/// One record of a task submission, as posted by the front-end
///
/// Fields stay loosely typed here; [`SubmittedAnnotation::into_edit`] does the
/// validation so malformed input surfaces as [`Error::Validation`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmittedAnnotation {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub start: Option<Value>,
    #[serde(default)]
    pub end: Option<Value>,
    /// Label; older clients send it as `name`
    #[serde(default, alias = "name")]
    pub annotation: Option<String>,
    /// `"yes"` when the user judged this segment against a reference segment
    #[serde(default)]
    pub similarity: Option<String>,
    #[serde(default)]
    pub reference: Option<i64>,
    #[serde(default, rename = "similValue")]
    pub simil_value: Option<Value>,
}

/// Boundaries and label of a segment
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start: Seconds,
    pub end: Seconds,
    pub name: String,
}

impl Segment {
    pub fn new(start: Seconds, end: Seconds, name: &str) -> Self {
        Self {
            start,
            end,
            name: name.to_string(),
        }
    }

    pub fn bounds(&self) -> (Seconds, Seconds) {
        (self.start, self.end)
    }
}

/// Judgment linking a segment to a reference annotation
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityLink {
    pub reference_id: i64,
    pub values: Map<String, Value>,
}

/// A validated submission record
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationEdit {
    New {
        segment: Segment,
        similarity: Option<SimilarityLink>,
    },
    Update {
        id: i64,
        segment: Segment,
        similarity: Option<SimilarityLink>,
    },
}

impl AnnotationEdit {
    pub fn id(&self) -> Option<i64> {
        match self {
            AnnotationEdit::New { .. } => None,
            AnnotationEdit::Update { id, .. } => Some(*id),
        }
    }

    pub fn segment(&self) -> &Segment {
        match self {
            AnnotationEdit::New { segment, .. } | AnnotationEdit::Update { segment, .. } => segment,
        }
    }

    pub fn similarity(&self) -> Option<&SimilarityLink> {
        match self {
            AnnotationEdit::New { similarity, .. } | AnnotationEdit::Update { similarity, .. } => {
                similarity.as_ref()
            }
        }
    }
}

impl SubmittedAnnotation {
    /// Validate against the target tier
    ///
    /// Point tiers accept a missing `end`, which then equals `start`.
    pub fn into_edit(self, tier: &Tier) -> Result<AnnotationEdit> {
        let start = match &self.start {
            Some(value) if !value.is_null() => Seconds::from_json(value)?,
            _ => return Err(Error::Validation("missing start".to_string())),
        };
        let end = match &self.end {
            Some(value) if !value.is_null() => Seconds::from_json(value)?,
            _ if tier.point_annotations => start,
            _ => return Err(Error::Validation("missing end".to_string())),
        };
        if end < start {
            return Err(Error::Validation(format!("end {} precedes start {}", end, start)));
        }

        let similarity = match self.similarity.as_deref() {
            None | Some("") | Some("no") => None,
            Some("yes") => {
                let reference_id = self.reference.ok_or_else(|| {
                    Error::Validation("similarity \"yes\" without a reference annotation".to_string())
                })?;
                Some(SimilarityLink {
                    reference_id,
                    values: similarity_values(self.simil_value, tier)?,
                })
            }
            Some(other) => {
                return Err(Error::Validation(format!(
                    "similarity must be \"yes\" or \"no\", got {:?}",
                    other
                )))
            }
        };

        let segment = Segment {
            start,
            end,
            name: self.annotation.unwrap_or_default(),
        };
        Ok(match self.id {
            Some(id) => AnnotationEdit::Update {
                id,
                segment,
                similarity,
            },
            None => AnnotationEdit::New { segment, similarity },
        })
    }
}

/// Normalize a similarity payload to a keyed map
fn similarity_values(raw: Option<Value>, tier: &Tier) -> Result<Map<String, Value>> {
    let values = match raw {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(scalar) => {
            let mut map = Map::new();
            map.insert("value".to_string(), scalar);
            map
        }
    };

    if !tier.similarity_keys.is_empty() {
        if let Some(key) = values.keys().find(|k| !tier.similarity_keys.contains(k)) {
            return Err(Error::Validation(format!(
                "similarity key {:?} is not one of tier {:?} keys {:?}",
                key, tier.name, tier.similarity_keys
            )));
        }
    }
    Ok(values)
}

/// Entry point used by the web layer
#[derive(Debug, Clone)]
pub struct AnnotationSynchronizer {
    pool: SqlitePool,
}

impl AnnotationSynchronizer {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Reconcile a submission for (sound, tier) and return the new state
    ///
    /// Callers must serialize concurrent edits to the same sound; the
    /// transaction only guarantees all-or-nothing for this call.
    pub async fn apply(
        &self,
        tier_id: i64,
        sound_id: i64,
        submitted: Vec<SubmittedAnnotation>,
        user_id: i64,
    ) -> Result<AnnotationState> {
        let mut tx = self.pool.begin().await?;
        let state = apply_submission(&mut tx, tier_id, sound_id, submitted, user_id).await?;
        tx.commit().await?;
        Ok(state)
    }
}

/// Load and check the participants, validate the records, then reconcile
pub async fn apply_submission(
    conn: &mut SqliteConnection,
    tier_id: i64,
    sound_id: i64,
    submitted: Vec<SubmittedAnnotation>,
    user_id: i64,
) -> Result<AnnotationState> {
    let sound = sounds::get_sound(conn, sound_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("sound {}", sound_id)))?;
    let tier = tiers::get_tier(conn, tier_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("tier {}", tier_id)))?;
    if tier.exercise_id != sound.exercise_id {
        return Err(Error::Integrity(format!(
            "tier {} belongs to exercise {} but sound {} belongs to exercise {}",
            tier.id, tier.exercise_id, sound.id, sound.exercise_id
        )));
    }
    if users::get_user(conn, user_id).await?.is_none() {
        return Err(Error::NotFound(format!("user {}", user_id)));
    }

    let edits = submitted
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            record.into_edit(&tier).map_err(|e| match e {
                Error::Validation(msg) => Error::Validation(format!("annotation {}: {}", index, msg)),
                other => other,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    apply_edits(conn, &tier, &sound, &edits, user_id).await
}

/// Reconcile validated edits for a (sound, tier) pair
pub async fn apply_edits(
    conn: &mut SqliteConnection,
    tier: &Tier,
    sound: &Sound,
    edits: &[AnnotationEdit],
    user_id: i64,
) -> Result<AnnotationState> {
    let graph = TierGraph::load(conn, tier.exercise_id).await?;
    graph.check_acyclic()?;

    let old = annotations::list_annotations(conn, sound.id, tier.id).await?;
    let deny_special_parent = special_parent_is_covered(conn, tier, sound.id, edits).await?;
    debug!(
        "Reconciling {} edits against {} rows on sound {} tier {} (special parent locked: {})",
        edits.len(),
        old.len(),
        sound.id,
        tier.id,
        deny_special_parent
    );

    let mut run = Reconciliation {
        sync_tiers: graph.sync_tiers(tier.id),
        special_parents: graph.special_parent_tiers(tier.id),
        special_children: graph.special_child_tiers(tier.id),
        direct_children: graph.direct_children(tier.id).to_vec(),
        tier,
        sound,
        user_id,
        deny_special_parent,
        old,
        applied: Vec::new(),
    };

    for edit in edits {
        run.apply_edit(conn, edit).await?;
    }
    run.delete_stale(conn).await?;
    run.backfill_children(conn).await?;

    let state = completion::tier_state(conn, sound, tier.id).await?;
    sounds::set_annotation_state(conn, sound.id, state).await?;
    info!(
        "Sound {} tier {} reconciled: {} annotations, state {}",
        sound.id,
        tier.id,
        run.applied.len(),
        state
    );
    Ok(state)
}

/// True when every boundary pair of the direct special parent's rows also
/// appears in the submission
///
/// A direct special parent with no rows for the sound counts as covered, which
/// also shields the ancestors above it. A tier without a special parent is
/// never covered.
async fn special_parent_is_covered(
    conn: &mut SqliteConnection,
    tier: &Tier,
    sound_id: i64,
    edits: &[AnnotationEdit],
) -> Result<bool> {
    let Some(parent_id) = tier.special_parent_tier_id else {
        return Ok(false);
    };

    let submitted: HashSet<(Seconds, Seconds)> =
        edits.iter().map(|e| e.segment().bounds()).collect();
    let parent_rows = annotations::list_annotations(conn, sound_id, parent_id).await?;
    Ok(parent_rows.iter().all(|row| submitted.contains(&row.bounds())))
}

struct Reconciliation<'a> {
    sync_tiers: BTreeSet<i64>,
    special_parents: BTreeSet<i64>,
    special_children: BTreeSet<i64>,
    direct_children: Vec<i64>,
    tier: &'a Tier,
    sound: &'a Sound,
    user_id: i64,
    deny_special_parent: bool,
    /// Rows of the target pair as loaded, kept current for repeated ids
    old: Vec<Annotation>,
    /// Annotation id and final segment, in submission order
    applied: Vec<(i64, Segment)>,
}

impl Reconciliation<'_> {
    async fn apply_edit(&mut self, conn: &mut SqliteConnection, edit: &AnnotationEdit) -> Result<()> {
        let segment = edit.segment();
        let existing = edit
            .id()
            .and_then(|id| self.old.iter().position(|row| row.id == id));

        let annotation_id = match existing {
            Some(index) => {
                let current = self.old[index].clone();
                self.update(conn, &current, segment).await?;
                let row = &mut self.old[index];
                row.start = segment.start;
                row.end = segment.end;
                row.name = segment.name.clone();
                current.id
            }
            None => {
                if let Some(id) = edit.id() {
                    debug!(
                        "Annotation {} is not on sound {} tier {}, creating a new one",
                        id, self.sound.id, self.tier.id
                    );
                }
                self.create(conn, segment).await?
            }
        };

        self.replace_similarity(conn, annotation_id, edit.similarity())
            .await?;

        match self.applied.iter_mut().find(|(id, _)| *id == annotation_id) {
            Some(entry) => entry.1 = segment.clone(),
            None => self.applied.push((annotation_id, segment.clone())),
        }
        Ok(())
    }

    async fn update(&self, conn: &mut SqliteConnection, current: &Annotation, segment: &Segment) -> Result<()> {
        for &tier_id in &self.sync_tiers {
            self.mirror_shared_boundaries(conn, tier_id, current, segment, Some(segment.name.as_str()))
                .await?;
        }

        if self.deny_special_parent {
            debug!(
                "Special parents of tier {} still covered by the submission, left untouched",
                self.tier.id
            );
        } else {
            for &tier_id in &self.special_parents {
                self.mirror_shared_boundaries(conn, tier_id, current, segment, None)
                    .await?;
            }
        }

        for &tier_id in &self.special_children {
            self.move_matching_endpoints(conn, tier_id, current, segment)
                .await?;
        }

        annotations::update_annotation(
            conn,
            current.id,
            segment.start,
            segment.end,
            Some(segment.name.as_str()),
            Some(self.user_id),
        )
        .await?;
        debug!(
            "Updated annotation {} [{} - {}] -> [{} - {}]",
            current.id, current.start, current.end, segment.start, segment.end
        );
        Ok(())
    }

    /// Rows sharing the old start take the new end; rows sharing the old end
    /// take the new start. A mirror of the edited row matches both.
    async fn mirror_shared_boundaries(
        &self,
        conn: &mut SqliteConnection,
        tier_id: i64,
        current: &Annotation,
        segment: &Segment,
        name: Option<&str>,
    ) -> Result<()> {
        let rows = annotations::list_annotations(conn, self.sound.id, tier_id).await?;
        for row in rows {
            let shares_start = row.start == current.start;
            let shares_end = row.end == current.end;
            if !shares_start && !shares_end {
                continue;
            }

            let start = if shares_end { segment.start } else { row.start };
            let end = if shares_start { segment.end } else { row.end };
            let renamed = name.is_some_and(|n| n != row.name);
            if start == row.start && end == row.end && !renamed {
                continue;
            }
            if end < start {
                warn!(
                    "Skipping propagation to annotation {} on tier {}: [{} - {}] would be inverted",
                    row.id, tier_id, start, end
                );
                continue;
            }

            annotations::update_annotation(conn, row.id, start, end, name, None).await?;
            debug!("Propagated update to annotation {} on tier {}", row.id, tier_id);
        }
        Ok(())
    }

    /// Endpoint-only correction for special children; labels stay as they are
    async fn move_matching_endpoints(
        &self,
        conn: &mut SqliteConnection,
        tier_id: i64,
        current: &Annotation,
        segment: &Segment,
    ) -> Result<()> {
        let rows = annotations::list_annotations(conn, self.sound.id, tier_id).await?;
        for row in rows {
            let start = if row.start == current.start { segment.start } else { row.start };
            let end = if row.end == current.end { segment.end } else { row.end };
            if start == row.start && end == row.end {
                continue;
            }
            if end < start {
                warn!(
                    "Skipping propagation to annotation {} on tier {}: [{} - {}] would be inverted",
                    row.id, tier_id, start, end
                );
                continue;
            }

            annotations::update_annotation(conn, row.id, start, end, None, None).await?;
            debug!("Moved endpoints of special child annotation {} on tier {}", row.id, tier_id);
        }
        Ok(())
    }

    async fn create(&self, conn: &mut SqliteConnection, segment: &Segment) -> Result<i64> {
        let created = annotations::insert_annotation(
            conn,
            &NewAnnotation {
                sound_id: self.sound.id,
                tier_id: self.tier.id,
                start: segment.start,
                end: segment.end,
                name: &segment.name,
                user_id: self.user_id,
            },
        )
        .await?;
        info!(
            "Created annotation {} [{} - {}] on sound {} tier {}",
            created.id, segment.start, segment.end, self.sound.id, self.tier.id
        );

        for &tier_id in &self.sync_tiers {
            self.insert_if_missing(conn, tier_id, segment, &segment.name)
                .await?;
        }
        for &tier_id in self.special_children.difference(&self.sync_tiers) {
            self.insert_if_missing(conn, tier_id, segment, "").await?;
        }

        Ok(created.id)
    }

    /// Copy a segment to a related tier unless it already holds those boundaries
    async fn insert_if_missing(
        &self,
        conn: &mut SqliteConnection,
        tier_id: i64,
        segment: &Segment,
        name: &str,
    ) -> Result<bool> {
        if annotations::has_annotation_with_bounds(conn, self.sound.id, tier_id, segment.start, segment.end)
            .await?
        {
            return Ok(false);
        }

        let copy = annotations::insert_annotation(
            conn,
            &NewAnnotation {
                sound_id: self.sound.id,
                tier_id,
                start: segment.start,
                end: segment.end,
                name,
                user_id: self.user_id,
            },
        )
        .await?;
        debug!("Propagated creation as annotation {} on tier {}", copy.id, tier_id);
        Ok(true)
    }

    async fn replace_similarity(
        &self,
        conn: &mut SqliteConnection,
        annotation_id: i64,
        link: Option<&SimilarityLink>,
    ) -> Result<()> {
        similarities::delete_user_similarities(conn, annotation_id, self.user_id).await?;

        if let Some(link) = link {
            if annotations::get_annotation(conn, link.reference_id).await?.is_none() {
                return Err(Error::Reference(link.reference_id));
            }
            similarities::insert_similarity(conn, link.reference_id, annotation_id, self.user_id, &link.values)
                .await?;
        }
        Ok(())
    }

    /// Delete rows of the target pair that were not part of the submission
    async fn delete_stale(&self, conn: &mut SqliteConnection) -> Result<()> {
        let kept: HashSet<i64> = self.applied.iter().map(|(id, _)| *id).collect();
        for row in self.old.iter().filter(|row| !kept.contains(&row.id)) {
            annotations::delete_annotation(conn, row.id).await?;
            info!(
                "Deleted annotation {} [{} - {}] from sound {} tier {}",
                row.id, row.start, row.end, self.sound.id, self.tier.id
            );
        }
        Ok(())
    }

    /// Populate direct sync children that hold nothing for this sound yet
    async fn backfill_children(&self, conn: &mut SqliteConnection) -> Result<()> {
        for &child_id in &self.direct_children {
            if annotations::count_annotations(conn, self.sound.id, child_id).await? > 0 {
                continue;
            }
            for (_, segment) in &self.applied {
                annotations::insert_annotation(
                    conn,
                    &NewAnnotation {
                        sound_id: self.sound.id,
                        tier_id: child_id,
                        start: segment.start,
                        end: segment.end,
                        name: &segment.name,
                        user_id: self.user_id,
                    },
                )
                .await?;
            }
            if !self.applied.is_empty() {
                info!(
                    "Back-filled {} annotations into child tier {} of sound {}",
                    self.applied.len(),
                    child_id,
                    self.sound.id
                );
            }
        }
        Ok(())
    }
}
