//! sima-server library - annotation task service
//!
//! Serves annotation tasks to the front-end, reconciles submitted
//! annotations and offers JSON downloads.

use axum::Router;
use sima_common::AnnotationSynchronizer;
use sqlx::SqlitePool;
use std::path::PathBuf;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;

/// Header carrying the username established by the fronting auth layer
pub const USER_HEADER: &str = "x-sima-user";

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub synchronizer: AnnotationSynchronizer,
    /// Prefix for sound URLs handed to the front-end
    pub media_url: String,
    /// Local directory served under `media_url`, when it is a path
    pub media_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(db: SqlitePool, media_url: &str) -> Self {
        Self {
            synchronizer: AnnotationSynchronizer::new(db.clone()),
            db,
            media_url: media_url.to_string(),
            media_dir: None,
        }
    }

    pub fn with_media_dir(mut self, media_dir: PathBuf) -> Self {
        self.media_dir = Some(media_dir);
        self
    }
}

/// Build application router
///
/// `/health` is public; every `/api` route requires an acting user.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::get;

    let protected = Router::new()
        .route(
            "/api/sounds/:sound_id/tiers/:tier_id/task",
            get(api::get_task).post(api::post_task),
        )
        .route("/api/sounds/:sound_id/annotations", get(api::download_sound))
        .route("/api/exercises/:exercise_id/annotations", get(api::download_exercise))
        .layer(middleware::from_fn_with_state(state.clone(), api::user_middleware));

    let mut router = Router::new().merge(protected).merge(api::health_routes());

    // Only a path-style media_url can be served locally
    if let Some(dir) = &state.media_dir {
        let mount = state.media_url.trim_end_matches('/');
        if mount.starts_with('/') && !mount.is_empty() {
            router = router.nest_service(mount, ServeDir::new(dir));
        }
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
