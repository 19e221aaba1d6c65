//! Database initialization
//!
//! Creates the database file on first run, applies connection pragmas and
//! builds every table with `CREATE TABLE IF NOT EXISTS` before running the
//! versioned migrations.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema
///
/// Uses a single long-lived connection: every new connection to
/// `sqlite::memory:` would see an empty database.
pub async fn init_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_users_table(pool).await?;
    create_data_sets_tables(pool).await?;
    create_exercises_table(pool).await?;
    create_tiers_table(pool).await?;
    create_tags_tables(pool).await?;
    create_sounds_table(pool).await?;
    create_annotations_table(pool).await?;
    create_annotation_similarities_table(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            is_staff INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_data_sets_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS data_sets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Users authorized to annotate a data set
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS data_set_users (
            data_set_id INTEGER NOT NULL REFERENCES data_sets(id) ON DELETE CASCADE,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            PRIMARY KEY (data_set_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_exercises_table(pool: &SqlitePool) -> Result<()> {
    // reference_sound_id points forward to sounds; SQLite resolves it lazily
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS exercises (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            data_set_id INTEGER NOT NULL REFERENCES data_sets(id) ON DELETE CASCADE,
            reference_sound_id INTEGER REFERENCES sounds(id) ON DELETE SET NULL,
            reference_pitch_sound TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_exercises_data_set ON exercises(data_set_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_tiers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tiers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            exercise_id INTEGER NOT NULL REFERENCES exercises(id) ON DELETE CASCADE,
            parent_tier_id INTEGER REFERENCES tiers(id) ON DELETE SET NULL,
            special_parent_tier_id INTEGER REFERENCES tiers(id) ON DELETE SET NULL,
            point_annotations INTEGER NOT NULL DEFAULT 0,
            entire_sound INTEGER NOT NULL DEFAULT 0,
            similarity_keys TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (exercise_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tiers_exercise ON tiers(exercise_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_tags_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tier_tags (
            tier_id INTEGER NOT NULL REFERENCES tiers(id) ON DELETE CASCADE,
            tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
            PRIMARY KEY (tier_id, tag_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_sounds_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sounds (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL,
            original_filename TEXT NOT NULL DEFAULT '',
            exercise_id INTEGER NOT NULL REFERENCES exercises(id) ON DELETE CASCADE,
            is_discarded INTEGER NOT NULL DEFAULT 0,
            annotation_state TEXT NOT NULL DEFAULT 'empty'
                CHECK (annotation_state IN ('empty', 'incomplete', 'complete')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sounds_exercise ON sounds(exercise_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sounds_filename ON sounds(filename)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the annotations table
///
/// Boundaries are whole milliseconds (see [`crate::time::Seconds`]).
async fn create_annotations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS annotations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL DEFAULT '',
            start_ms INTEGER NOT NULL,
            end_ms INTEGER NOT NULL,
            sound_id INTEGER NOT NULL REFERENCES sounds(id) ON DELETE CASCADE,
            tier_id INTEGER NOT NULL REFERENCES tiers(id) ON DELETE CASCADE,
            user_id INTEGER NOT NULL REFERENCES users(id),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (start_ms >= 0),
            CHECK (end_ms >= start_ms)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_annotations_sound_tier ON annotations(sound_id, tier_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_annotation_similarities_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS annotation_similarities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            reference_id INTEGER NOT NULL REFERENCES annotations(id) ON DELETE CASCADE,
            similar_id INTEGER NOT NULL REFERENCES annotations(id) ON DELETE CASCADE,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            similarity TEXT NOT NULL DEFAULT '{}',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_similarities_similar ON annotation_similarities(similar_id, user_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
