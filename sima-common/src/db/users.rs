//! User lookups
//!
//! Accounts are provisioned by the authentication layer; this module only
//! creates them for admin commands and tests.

use super::models::User;
use crate::Result;
use sqlx::SqliteConnection;

pub async fn create_user(conn: &mut SqliteConnection, username: &str, is_staff: bool) -> Result<User> {
    let id = sqlx::query("INSERT INTO users (username, is_staff) VALUES (?, ?)")
        .bind(username)
        .bind(is_staff)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

    Ok(User {
        id,
        username: username.to_string(),
        is_staff,
    })
}

pub async fn get_user(conn: &mut SqliteConnection, user_id: i64) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, username, is_staff FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(User::from_row).transpose()
}

pub async fn get_user_by_username(conn: &mut SqliteConnection, username: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, username, is_staff FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(User::from_row).transpose()
}
