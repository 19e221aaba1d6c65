//! Annotation persistence
//!
//! Boundaries are bound as integer milliseconds; see [`crate::time::Seconds`].

use super::models::Annotation;
use crate::time::Seconds;
use crate::Result;
use sqlx::SqliteConnection;

const ANNOTATION_COLUMNS: &str = "id, name, start_ms, end_ms, sound_id, tier_id, user_id";

/// Attributes for an annotation about to be inserted
#[derive(Debug, Clone)]
pub struct NewAnnotation<'a> {
    pub sound_id: i64,
    pub tier_id: i64,
    pub start: Seconds,
    pub end: Seconds,
    pub name: &'a str,
    pub user_id: i64,
}

pub async fn insert_annotation(conn: &mut SqliteConnection, new: &NewAnnotation<'_>) -> Result<Annotation> {
    let id = sqlx::query(
        r#"
        INSERT INTO annotations (name, start_ms, end_ms, sound_id, tier_id, user_id)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(new.name)
    .bind(new.start.millis())
    .bind(new.end.millis())
    .bind(new.sound_id)
    .bind(new.tier_id)
    .bind(new.user_id)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(Annotation {
        id,
        name: new.name.to_string(),
        start: new.start,
        end: new.end,
        sound_id: new.sound_id,
        tier_id: new.tier_id,
        user_id: new.user_id,
    })
}

pub async fn get_annotation(conn: &mut SqliteConnection, annotation_id: i64) -> Result<Option<Annotation>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM annotations WHERE id = ?",
        ANNOTATION_COLUMNS
    ))
    .bind(annotation_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(Annotation::from_row).transpose()
}

/// Annotations on one (sound, tier) pair, in insertion order
pub async fn list_annotations(conn: &mut SqliteConnection, sound_id: i64, tier_id: i64) -> Result<Vec<Annotation>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM annotations WHERE sound_id = ? AND tier_id = ? ORDER BY id",
        ANNOTATION_COLUMNS
    ))
    .bind(sound_id)
    .bind(tier_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(Annotation::from_row).collect()
}

pub async fn count_annotations(conn: &mut SqliteConnection, sound_id: i64, tier_id: i64) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM annotations WHERE sound_id = ? AND tier_id = ?")
            .bind(sound_id)
            .bind(tier_id)
            .fetch_one(&mut *conn)
            .await?;

    Ok(count)
}

/// Whether a (sound, tier) pair already holds a segment with these boundaries
pub async fn has_annotation_with_bounds(
    conn: &mut SqliteConnection,
    sound_id: i64,
    tier_id: i64,
    start: Seconds,
    end: Seconds,
) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM annotations
            WHERE sound_id = ? AND tier_id = ? AND start_ms = ? AND end_ms = ?
        )
        "#,
    )
    .bind(sound_id)
    .bind(tier_id)
    .bind(start.millis())
    .bind(end.millis())
    .fetch_one(&mut *conn)
    .await?;

    Ok(exists)
}

/// Rewrite boundaries, optionally the label and the authoring user
pub async fn update_annotation(
    conn: &mut SqliteConnection,
    annotation_id: i64,
    start: Seconds,
    end: Seconds,
    name: Option<&str>,
    user_id: Option<i64>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE annotations
        SET start_ms = ?,
            end_ms = ?,
            name = COALESCE(?, name),
            user_id = COALESCE(?, user_id),
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(start.millis())
    .bind(end.millis())
    .bind(name)
    .bind(user_id)
    .bind(annotation_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn delete_annotation(conn: &mut SqliteConnection, annotation_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM annotations WHERE id = ?")
        .bind(annotation_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}
