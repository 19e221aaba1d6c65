//! Annotation task API
//!
//! GET returns the reference and user segments for a (sound, tier) pair;
//! POST reconciles the submitted segments and returns the new state.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use sima_common::db::models::Sound;
use sima_common::db::{exercises, sounds, tiers};
use sima_common::projections::{annotations_for_tier, TaskSegment};
use sima_common::{AnnotationState, SubmittedAnnotation};
use tracing::info;

use crate::api::ActingUser;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct Task {
    pub segments_ref: Vec<TaskSegment>,
    pub segments: Vec<TaskSegment>,
    pub url: String,
    pub url_ref: Option<String>,
    pub tags: Vec<String>,
    pub point_annotations: bool,
    pub similarity_keys: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub task: Task,
}

#[derive(Debug, Deserialize)]
pub struct TaskSubmission {
    pub annotations: Vec<SubmittedAnnotation>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub status: String,
    pub annotation_state: AnnotationState,
}

fn media_url(prefix: &str, sound: &Sound) -> String {
    format!("{}{}", prefix, sound.filename)
}

/// GET /api/sounds/:sound_id/tiers/:tier_id/task
pub async fn get_task(
    State(state): State<AppState>,
    Path((sound_id, tier_id)): Path<(i64, i64)>,
    Extension(ActingUser(user)): Extension<ActingUser>,
) -> ApiResult<Json<TaskResponse>> {
    let mut conn = state.db.acquire().await?;

    let sound = sounds::get_sound(&mut conn, sound_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("sound {}", sound_id)))?;
    let tier = tiers::get_tier(&mut conn, tier_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("tier {}", tier_id)))?;
    if tier.exercise_id != sound.exercise_id {
        return Err(sima_common::Error::Integrity(format!(
            "tier {} does not belong to the exercise of sound {}",
            tier_id, sound_id
        ))
        .into());
    }

    let exercise = exercises::get_exercise(&mut conn, sound.exercise_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("exercise {}", sound.exercise_id)))?;
    let reference = match exercise.reference_sound_id {
        Some(id) => sounds::get_sound(&mut conn, id).await?,
        None => None,
    };

    let segments_ref = match &reference {
        Some(reference) => annotations_for_tier(&mut conn, reference.id, tier.id, None).await?,
        None => Vec::new(),
    };
    let segments = annotations_for_tier(&mut conn, sound.id, tier.id, Some(&user)).await?;
    let tags = tiers::list_tier_tags(&mut conn, tier.id)
        .await?
        .into_iter()
        .map(|tag| tag.name)
        .collect();

    Ok(Json(TaskResponse {
        task: Task {
            segments_ref,
            segments,
            url: media_url(&state.media_url, &sound),
            url_ref: reference.as_ref().map(|r| media_url(&state.media_url, r)),
            tags,
            point_annotations: tier.point_annotations,
            similarity_keys: tier.similarity_keys,
        },
    }))
}

/// POST /api/sounds/:sound_id/tiers/:tier_id/task
pub async fn post_task(
    State(state): State<AppState>,
    Path((sound_id, tier_id)): Path<(i64, i64)>,
    Extension(ActingUser(user)): Extension<ActingUser>,
    Json(submission): Json<TaskSubmission>,
) -> ApiResult<Json<SubmissionResponse>> {
    let count = submission.annotations.len();
    let annotation_state = state
        .synchronizer
        .apply(tier_id, sound_id, submission.annotations, user.id)
        .await?;

    info!(
        "{} submitted {} annotations for sound {} tier {}: {}",
        user.username, count, sound_id, tier_id, annotation_state
    );
    Ok(Json(SubmissionResponse {
        status: "success".to_string(),
        annotation_state,
    }))
}
