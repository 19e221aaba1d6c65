//! Data set and exercise persistence

use super::models::{DataSet, Exercise, User};
use crate::Result;
use sqlx::{Row, SqliteConnection};

pub async fn create_data_set(conn: &mut SqliteConnection, name: &str) -> Result<DataSet> {
    let id = sqlx::query("INSERT INTO data_sets (name) VALUES (?)")
        .bind(name)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

    Ok(DataSet {
        id,
        name: name.to_string(),
    })
}

pub async fn get_data_set_by_name(conn: &mut SqliteConnection, name: &str) -> Result<Option<DataSet>> {
    let row = sqlx::query("SELECT id, name FROM data_sets WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(match row {
        Some(row) => Some(DataSet {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
        }),
        None => None,
    })
}

/// Authorize a user on a data set (no-op when already authorized)
pub async fn add_data_set_user(conn: &mut SqliteConnection, data_set_id: i64, user_id: i64) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO data_set_users (data_set_id, user_id) VALUES (?, ?)")
        .bind(data_set_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

pub async fn list_data_set_users(conn: &mut SqliteConnection, data_set_id: i64) -> Result<Vec<User>> {
    let rows = sqlx::query(
        r#"
        SELECT u.id, u.username, u.is_staff
        FROM users u
        JOIN data_set_users d ON d.user_id = u.id
        WHERE d.data_set_id = ?
        ORDER BY u.id
        "#,
    )
    .bind(data_set_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(User::from_row).collect()
}

pub async fn create_exercise(conn: &mut SqliteConnection, data_set_id: i64, name: &str) -> Result<Exercise> {
    let id = sqlx::query("INSERT INTO exercises (name, data_set_id) VALUES (?, ?)")
        .bind(name)
        .bind(data_set_id)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

    Ok(Exercise {
        id,
        name: name.to_string(),
        data_set_id,
        reference_sound_id: None,
        reference_pitch_sound: None,
    })
}

pub async fn get_exercise(conn: &mut SqliteConnection, exercise_id: i64) -> Result<Option<Exercise>> {
    let row = sqlx::query(
        "SELECT id, name, data_set_id, reference_sound_id, reference_pitch_sound FROM exercises WHERE id = ?",
    )
    .bind(exercise_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(Exercise::from_row).transpose()
}

pub async fn list_exercises_for_data_set(conn: &mut SqliteConnection, data_set_id: i64) -> Result<Vec<Exercise>> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, data_set_id, reference_sound_id, reference_pitch_sound
        FROM exercises
        WHERE data_set_id = ?
        ORDER BY id
        "#,
    )
    .bind(data_set_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(Exercise::from_row).collect()
}

/// Designate the exercise's ground-truth sound
pub async fn set_reference_sound(conn: &mut SqliteConnection, exercise_id: i64, sound_id: Option<i64>) -> Result<()> {
    sqlx::query("UPDATE exercises SET reference_sound_id = ? WHERE id = ?")
        .bind(sound_id)
        .bind(exercise_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}
