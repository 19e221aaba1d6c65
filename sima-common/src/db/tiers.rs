//! Tier and tag persistence

use super::models::{Tag, Tier};
use crate::Result;
use sqlx::{Row, SqliteConnection};

const TIER_COLUMNS: &str = "id, name, exercise_id, parent_tier_id, special_parent_tier_id, \
                            point_annotations, entire_sound, similarity_keys";

/// Attributes for a tier about to be inserted
#[derive(Debug, Clone, Default)]
pub struct NewTier {
    pub name: String,
    pub exercise_id: i64,
    pub parent_tier_id: Option<i64>,
    pub special_parent_tier_id: Option<i64>,
    pub point_annotations: bool,
    pub entire_sound: bool,
    pub similarity_keys: Vec<String>,
}

impl NewTier {
    pub fn new(exercise_id: i64, name: &str) -> Self {
        Self {
            name: name.to_string(),
            exercise_id,
            ..Default::default()
        }
    }

    pub fn parent(mut self, tier_id: i64) -> Self {
        self.parent_tier_id = Some(tier_id);
        self
    }

    pub fn special_parent(mut self, tier_id: i64) -> Self {
        self.special_parent_tier_id = Some(tier_id);
        self
    }

    pub fn point_annotations(mut self) -> Self {
        self.point_annotations = true;
        self
    }

    pub fn similarity_keys(mut self, keys: &[&str]) -> Self {
        self.similarity_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }
}

pub async fn create_tier(conn: &mut SqliteConnection, tier: &NewTier) -> Result<Tier> {
    let keys = if tier.similarity_keys.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&tier.similarity_keys)?)
    };

    let id = sqlx::query(
        r#"
        INSERT INTO tiers (
            name, exercise_id, parent_tier_id, special_parent_tier_id,
            point_annotations, entire_sound, similarity_keys
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&tier.name)
    .bind(tier.exercise_id)
    .bind(tier.parent_tier_id)
    .bind(tier.special_parent_tier_id)
    .bind(tier.point_annotations)
    .bind(tier.entire_sound)
    .bind(keys)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(Tier {
        id,
        name: tier.name.clone(),
        exercise_id: tier.exercise_id,
        parent_tier_id: tier.parent_tier_id,
        special_parent_tier_id: tier.special_parent_tier_id,
        point_annotations: tier.point_annotations,
        entire_sound: tier.entire_sound,
        similarity_keys: tier.similarity_keys.clone(),
    })
}

pub async fn get_tier(conn: &mut SqliteConnection, tier_id: i64) -> Result<Option<Tier>> {
    let row = sqlx::query(&format!("SELECT {} FROM tiers WHERE id = ?", TIER_COLUMNS))
        .bind(tier_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(Tier::from_row).transpose()
}

/// All tiers of an exercise, in creation order
pub async fn list_tiers_for_exercise(conn: &mut SqliteConnection, exercise_id: i64) -> Result<Vec<Tier>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM tiers WHERE exercise_id = ? ORDER BY id",
        TIER_COLUMNS
    ))
    .bind(exercise_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(Tier::from_row).collect()
}

pub async fn find_tier_by_name(conn: &mut SqliteConnection, exercise_id: i64, name: &str) -> Result<Option<Tier>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM tiers WHERE exercise_id = ? AND name = ?",
        TIER_COLUMNS
    ))
    .bind(exercise_id)
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(Tier::from_row).transpose()
}

/// Point a tier at a new hierarchical parent (or detach it)
pub async fn set_parent_tier(conn: &mut SqliteConnection, tier_id: i64, parent_tier_id: Option<i64>) -> Result<()> {
    sqlx::query("UPDATE tiers SET parent_tier_id = ? WHERE id = ?")
        .bind(parent_tier_id)
        .bind(tier_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

pub async fn set_special_parent_tier(
    conn: &mut SqliteConnection,
    tier_id: i64,
    special_parent_tier_id: Option<i64>,
) -> Result<()> {
    sqlx::query("UPDATE tiers SET special_parent_tier_id = ? WHERE id = ?")
        .bind(special_parent_tier_id)
        .bind(tier_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Find or create a tag and attach it to a tier
pub async fn add_tier_tag(conn: &mut SqliteConnection, tier_id: i64, tag_name: &str) -> Result<Tag> {
    sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?)")
        .bind(tag_name)
        .execute(&mut *conn)
        .await?;

    let tag_id: i64 = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?")
        .bind(tag_name)
        .fetch_one(&mut *conn)
        .await?;

    sqlx::query("INSERT OR IGNORE INTO tier_tags (tier_id, tag_id) VALUES (?, ?)")
        .bind(tier_id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await?;

    Ok(Tag {
        id: tag_id,
        name: tag_name.to_string(),
    })
}

pub async fn list_tier_tags(conn: &mut SqliteConnection, tier_id: i64) -> Result<Vec<Tag>> {
    let rows = sqlx::query(
        r#"
        SELECT t.id, t.name
        FROM tags t
        JOIN tier_tags tt ON tt.tag_id = t.id
        WHERE tt.tier_id = ?
        ORDER BY t.name
        "#,
    )
    .bind(tier_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(Tag {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
            })
        })
        .collect()
}
