//! Sound persistence

use super::models::{AnnotationState, Sound};
use crate::Result;
use sqlx::SqliteConnection;
use std::path::Path;
use tracing::info;

const SOUND_COLUMNS: &str =
    "id, filename, original_filename, exercise_id, is_discarded, annotation_state";

pub async fn create_sound(
    conn: &mut SqliteConnection,
    exercise_id: i64,
    filename: &str,
    original_filename: &str,
) -> Result<Sound> {
    let id = sqlx::query(
        "INSERT INTO sounds (filename, original_filename, exercise_id) VALUES (?, ?, ?)",
    )
    .bind(filename)
    .bind(original_filename)
    .bind(exercise_id)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(Sound {
        id,
        filename: filename.to_string(),
        original_filename: original_filename.to_string(),
        exercise_id,
        is_discarded: false,
        annotation_state: AnnotationState::Empty,
    })
}

pub async fn get_sound(conn: &mut SqliteConnection, sound_id: i64) -> Result<Option<Sound>> {
    let row = sqlx::query(&format!("SELECT {} FROM sounds WHERE id = ?", SOUND_COLUMNS))
        .bind(sound_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(Sound::from_row).transpose()
}

pub async fn list_sounds_for_exercise(conn: &mut SqliteConnection, exercise_id: i64) -> Result<Vec<Sound>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM sounds WHERE exercise_id = ? ORDER BY id",
        SOUND_COLUMNS
    ))
    .bind(exercise_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(Sound::from_row).collect()
}

/// Sounds across all exercises named `name`, with or without an extension
///
/// `"take_03"` matches both `take_03` and `take_03.wav`.
pub async fn find_sounds_by_stem(conn: &mut SqliteConnection, name: &str) -> Result<Vec<Sound>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM sounds WHERE filename = ?1 OR substr(filename, 1, length(?1) + 1) = ?1 || '.' ORDER BY id",
        SOUND_COLUMNS
    ))
    .bind(name)
    .fetch_all(&mut *conn)
    .await?;

    let mut found = Vec::with_capacity(rows.len());
    for row in &rows {
        let sound = Sound::from_row(row)?;
        let stem = Path::new(&sound.filename).file_stem().and_then(|s| s.to_str());
        if sound.filename == name || stem == Some(name) {
            found.push(sound);
        }
    }
    Ok(found)
}

/// Look up a sound by `(exercise, filename)`, registering it when absent
pub async fn get_or_create_sound(
    conn: &mut SqliteConnection,
    exercise_id: i64,
    filename: &str,
    original_filename: &str,
) -> Result<Sound> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM sounds WHERE exercise_id = ? AND filename = ? ORDER BY id LIMIT 1",
        SOUND_COLUMNS
    ))
    .bind(exercise_id)
    .bind(filename)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(row) = row {
        return Sound::from_row(&row);
    }

    let sound = create_sound(conn, exercise_id, filename, original_filename).await?;
    info!("Registered sound {} ({}) in exercise {}", sound.id, filename, exercise_id);
    Ok(sound)
}

/// Store a derived state; see [`Sound::annotation_state`] for its scope
pub async fn set_annotation_state(conn: &mut SqliteConnection, sound_id: i64, state: AnnotationState) -> Result<()> {
    sqlx::query("UPDATE sounds SET annotation_state = ? WHERE id = ?")
        .bind(state.as_str())
        .bind(sound_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

pub async fn set_discarded(conn: &mut SqliteConnection, sound_id: i64, discarded: bool) -> Result<()> {
    sqlx::query("UPDATE sounds SET is_discarded = ? WHERE id = ?")
        .bind(discarded)
        .bind(sound_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}
