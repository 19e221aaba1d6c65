//! Database schema migrations
//!
//! Versioned, idempotent upgrades for databases created by older releases.
//! Fresh databases already have every column from `init::create_schema`, so
//! each step checks `pragma_table_info` before altering anything.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - They must remain stable for users upgrading from older versions
//! 2. **Always add new migrations** - Create a new migration function for each schema change
//! 3. **Use ALTER TABLE** - Prefer ALTER TABLE over DROP/CREATE to preserve data

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

async fn has_column(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?",
    )
    .bind(table)
    .bind(column)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("Migration v2 completed");
    }

    Ok(())
}

/// Migration v1: point tiers and similarity dimensions on tiers
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    if !has_column(pool, "tiers", "point_annotations").await? {
        sqlx::query("ALTER TABLE tiers ADD COLUMN point_annotations INTEGER NOT NULL DEFAULT 0")
            .execute(pool)
            .await?;
        info!("Migration v1: Added point_annotations to tiers table");
    }

    if !has_column(pool, "tiers", "similarity_keys").await? {
        sqlx::query("ALTER TABLE tiers ADD COLUMN similarity_keys TEXT")
            .execute(pool)
            .await?;
        info!("Migration v1: Added similarity_keys to tiers table");
    }

    Ok(())
}

/// Migration v2: replace the boolean `has_annotations` flag with `annotation_state`
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    if !has_column(pool, "sounds", "annotation_state").await? {
        sqlx::query(
            "ALTER TABLE sounds ADD COLUMN annotation_state TEXT NOT NULL DEFAULT 'empty' \
             CHECK (annotation_state IN ('empty', 'incomplete', 'complete'))",
        )
        .execute(pool)
        .await?;
        info!("Migration v2: Added annotation_state to sounds table");
    }

    if has_column(pool, "sounds", "has_annotations").await? {
        let result = sqlx::query(
            "UPDATE sounds SET annotation_state = 'incomplete' \
             WHERE has_annotations = 1 AND annotation_state = 'empty'",
        )
        .execute(pool)
        .await?;
        info!(
            "Migration v2: Carried over has_annotations for {} sounds",
            result.rows_affected()
        );
    }

    Ok(())
}
