//! Bulk import of externally produced annotations
//!
//! Each `<sound filename>.json` file maps tier names to lists of segments,
//! each paired with the matching segment of the exercise's reference sound:
//!
//! ```json
//! { "melody": [ { "start_time": 1.2, "end_time": 2.0,
//!                 "ref_start_time": 1.1, "ref_end_time": 2.1,
//!                 "value": "3" } ] }
//! ```
//!
//! Every entry becomes a reference annotation, a sound annotation and a
//! similarity judgment by the importing user. Missing tiers are created.

use crate::completion;
use crate::db::annotations::{self, NewAnnotation};
use crate::db::models::{AnnotationState, User};
use crate::db::tiers::NewTier;
use crate::db::{exercises, similarities, sounds, tiers, users};
use crate::time::Seconds;
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct ImportedAnnotation {
    pub start_time: Value,
    pub end_time: Value,
    pub ref_start_time: Value,
    pub ref_end_time: Value,
    pub value: Value,
}

/// Similarity values given as strings must hold integers
fn similarity_value(value: &Value) -> Result<Value> {
    match value {
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| Error::Validation(format!("similarity value {:?} is not an integer", text))),
        other => Ok(other.clone()),
    }
}

fn bounds(start: &Value, end: &Value) -> Result<(Seconds, Seconds)> {
    let start = Seconds::from_json(start)?;
    let end = Seconds::from_json(end)?;
    if end < start {
        return Err(Error::Validation(format!("end {} precedes start {}", end, start)));
    }
    Ok((start, end))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub files: usize,
    pub annotations: usize,
    pub failed: Vec<PathBuf>,
}

/// Import every `*.json` file in `dir` on behalf of `username`
///
/// A file that fails is logged and skipped; its changes are rolled back.
pub async fn import_directory(pool: &SqlitePool, dir: &Path, username: &str) -> Result<ImportSummary> {
    let user = {
        let mut conn = pool.acquire().await?;
        users::get_user_by_username(&mut conn, username)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {:?}", username)))?
    };

    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut summary = ImportSummary::default();
    for path in paths {
        match import_file(pool, &path, &user).await {
            Ok(count) => {
                summary.files += 1;
                summary.annotations += count;
            }
            Err(e) => {
                warn!("Failed to import {}: {}", path.display(), e);
                summary.failed.push(path);
            }
        }
    }

    info!(
        "Imported {} annotations from {} files ({} failed)",
        summary.annotations,
        summary.files,
        summary.failed.len()
    );
    Ok(summary)
}

/// Import one annotations file in a single transaction
pub async fn import_file(pool: &SqlitePool, path: &Path, user: &User) -> Result<usize> {
    let sound_name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| Error::Validation(format!("unusable file name {}", path.display())))?;
    let content = tokio::fs::read_to_string(path).await?;
    let file: BTreeMap<String, Vec<ImportedAnnotation>> = serde_json::from_str(&content)?;

    let mut tx = pool.begin().await?;

    let matches = sounds::find_sounds_by_stem(&mut tx, sound_name).await?;
    let sound = matches
        .first()
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("sound {:?}", sound_name)))?;
    if matches.len() > 1 {
        warn!(
            "{} sounds named {:?}, importing into sound {}",
            matches.len(),
            sound_name,
            sound.id
        );
    }

    let exercise = exercises::get_exercise(&mut tx, sound.exercise_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("exercise {}", sound.exercise_id)))?;
    let reference_sound_id = exercise
        .reference_sound_id
        .ok_or_else(|| Error::NotFound(format!("reference sound of exercise {:?}", exercise.name)))?;

    let mut imported = 0;
    for (tier_name, entries) in &file {
        let tier = match tiers::find_tier_by_name(&mut tx, exercise.id, tier_name).await? {
            Some(tier) => tier,
            None => {
                info!("Creating tier {:?} in exercise {:?}", tier_name, exercise.name);
                tiers::create_tier(&mut tx, &NewTier::new(exercise.id, tier_name)).await?
            }
        };

        for entry in entries {
            let (ref_start, ref_end) = bounds(&entry.ref_start_time, &entry.ref_end_time)?;
            let (start, end) = bounds(&entry.start_time, &entry.end_time)?;

            let reference = annotations::insert_annotation(
                &mut tx,
                &NewAnnotation {
                    sound_id: reference_sound_id,
                    tier_id: tier.id,
                    start: ref_start,
                    end: ref_end,
                    name: "",
                    user_id: user.id,
                },
            )
            .await?;
            let annotation = annotations::insert_annotation(
                &mut tx,
                &NewAnnotation {
                    sound_id: sound.id,
                    tier_id: tier.id,
                    start,
                    end,
                    name: "",
                    user_id: user.id,
                },
            )
            .await?;

            let mut values = Map::new();
            values.insert("value".to_string(), similarity_value(&entry.value)?);
            similarities::insert_similarity(&mut tx, reference.id, annotation.id, user.id, &values).await?;
            imported += 1;
        }
    }

    let exercise_tiers = tiers::list_tiers_for_exercise(&mut tx, exercise.id).await?;
    let state: AnnotationState = completion::refresh_sound(&mut tx, &sound, &exercise_tiers).await?;

    tx.commit().await?;
    info!(
        "Imported {} annotations for sound {:?} from {}, state {}",
        imported,
        sound_name,
        path.display(),
        state
    );
    Ok(imported)
}
