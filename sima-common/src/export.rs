//! Export of a data set's annotations, one JSON file per sound

use crate::db::models::Sound;
use crate::db::{exercises, sounds};
use crate::projections;
use crate::{Error, Result};
use sqlx::{SqliteConnection, SqlitePool};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub written: Vec<PathBuf>,
    pub failed: usize,
}

/// `<out_dir>/<filename stem>.json`
pub fn export_path(out_dir: &Path, sound: &Sound) -> PathBuf {
    let stem = Path::new(&sound.filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| sound.filename.clone());
    out_dir.join(format!("{}.json", stem))
}

/// Write `annotations_as_dict` for every annotated sound of a data set
///
/// Reference and discarded sounds are skipped. A sound that fails to export
/// is logged and counted, the rest still proceed.
pub async fn export_data_set(pool: &SqlitePool, data_set_name: &str, out_dir: &Path) -> Result<ExportSummary> {
    let mut conn = pool.acquire().await?;
    let data_set = exercises::get_data_set_by_name(&mut conn, data_set_name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("data set {:?}", data_set_name)))?;
    tokio::fs::create_dir_all(out_dir).await?;

    let mut summary = ExportSummary::default();
    for exercise in exercises::list_exercises_for_data_set(&mut conn, data_set.id).await? {
        for sound in sounds::list_sounds_for_exercise(&mut conn, exercise.id).await? {
            if exercise.reference_sound_id == Some(sound.id) || sound.is_discarded {
                debug!("Skipping sound {} ({})", sound.id, sound.filename);
                continue;
            }
            match export_sound(&mut conn, &sound, out_dir).await {
                Ok(path) => summary.written.push(path),
                Err(e) => {
                    warn!("Failed to export sound {} ({}): {}", sound.id, sound.filename, e);
                    summary.failed += 1;
                }
            }
        }
    }

    info!(
        "Exported {} sounds of data set {:?} to {} ({} failed)",
        summary.written.len(),
        data_set_name,
        out_dir.display(),
        summary.failed
    );
    Ok(summary)
}

async fn export_sound(conn: &mut SqliteConnection, sound: &Sound, out_dir: &Path) -> Result<PathBuf> {
    let annotations = projections::annotations_as_dict(conn, sound).await?;
    let path = export_path(out_dir, sound);
    tokio::fs::write(&path, serde_json::to_vec_pretty(&annotations)?).await?;
    Ok(path)
}
