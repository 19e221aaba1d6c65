//! Annotation downloads

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use sima_common::db::{exercises, sounds};
use sima_common::projections::{annotations_as_dict, exercise_annotations};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /api/sounds/:sound_id/annotations
///
/// One key per tier name of the sound's exercise.
pub async fn download_sound(State(state): State<AppState>, Path(sound_id): Path<i64>) -> ApiResult<Response> {
    let mut conn = state.db.acquire().await?;
    let sound = sounds::get_sound(&mut conn, sound_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("sound {}", sound_id)))?;

    let annotations = annotations_as_dict(&mut conn, &sound).await?;
    Ok(Json(annotations).into_response())
}

/// GET /api/exercises/:exercise_id/annotations
///
/// Served as an attachment named after the exercise.
pub async fn download_exercise(
    State(state): State<AppState>,
    Path(exercise_id): Path<i64>,
) -> ApiResult<Response> {
    let mut conn = state.db.acquire().await?;
    let exercise = exercises::get_exercise(&mut conn, exercise_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("exercise {}", exercise_id)))?;

    let annotations = exercise_annotations(&mut conn, exercise.id).await?;
    let disposition = format!("attachment; filename=\"{}.json\"", exercise.name.replace('"', ""));
    Ok(([(header::CONTENT_DISPOSITION, disposition)], Json(annotations)).into_response())
}
