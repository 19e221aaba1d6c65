//! Annotation similarity persistence
//!
//! Rows are replaced wholesale (delete then insert), never patched.

use super::models::AnnotationSimilarity;
use crate::Result;
use serde_json::{Map, Value};
use sqlx::SqliteConnection;

const SIMILARITY_COLUMNS: &str = "id, reference_id, similar_id, user_id, similarity";

pub async fn insert_similarity(
    conn: &mut SqliteConnection,
    reference_id: i64,
    similar_id: i64,
    user_id: i64,
    values: &Map<String, Value>,
) -> Result<AnnotationSimilarity> {
    let payload = serde_json::to_string(values)?;
    let id = sqlx::query(
        r#"
        INSERT INTO annotation_similarities (reference_id, similar_id, user_id, similarity)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(reference_id)
    .bind(similar_id)
    .bind(user_id)
    .bind(payload)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(AnnotationSimilarity {
        id,
        reference_id,
        similar_id,
        user_id,
        values: values.clone(),
    })
}

/// Remove a user's judgments on one annotation; returns the number removed
pub async fn delete_user_similarities(conn: &mut SqliteConnection, similar_id: i64, user_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM annotation_similarities WHERE similar_id = ? AND user_id = ?")
        .bind(similar_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

/// All judgments on one annotation, oldest first
pub async fn list_similarities_for(conn: &mut SqliteConnection, similar_id: i64) -> Result<Vec<AnnotationSimilarity>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM annotation_similarities WHERE similar_id = ? ORDER BY id",
        SIMILARITY_COLUMNS
    ))
    .bind(similar_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(AnnotationSimilarity::from_row).collect()
}

/// Judgments attached to any annotation of a (sound, tier) pair
pub async fn count_similarities(conn: &mut SqliteConnection, sound_id: i64, tier_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM annotation_similarities s
        JOIN annotations a ON a.id = s.similar_id
        WHERE a.sound_id = ? AND a.tier_id = ?
        "#,
    )
    .bind(sound_id)
    .bind(tier_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count)
}
