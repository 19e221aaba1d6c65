//! Database schema, models and repositories
//!
//! Repository functions take `&mut SqliteConnection` so the same code runs on
//! a pooled connection or inside the transaction wrapping a reconciliation.

pub mod annotations;
pub mod exercises;
pub mod init;
pub mod migrations;
pub mod models;
pub mod similarities;
pub mod sounds;
pub mod tiers;
pub mod users;

pub use init::*;
pub use migrations::run_migrations;
pub use models::*;
