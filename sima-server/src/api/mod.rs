//! HTTP API handlers for sima-server

pub mod auth;
pub mod download;
pub mod health;
pub mod task;

pub use auth::{user_middleware, ActingUser};
pub use download::{download_exercise, download_sound};
pub use health::health_routes;
pub use task::{get_task, post_task};
