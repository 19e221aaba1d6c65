//! # Simannotator Common Library
//!
//! Shared code for the simannotator service and admin tools including:
//! - Database schema, models and repositories
//! - Tier relationship graph
//! - Annotation synchronization and completion state
//! - Read-side projections for task views and downloads
//! - Annotation import/export
//! - Configuration loading

pub mod completion;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod graph;
pub mod import;
pub mod projections;
pub mod sync;
pub mod time;

pub use db::models::AnnotationState;
pub use error::{Error, Result};
pub use graph::TierGraph;
pub use sync::{AnnotationEdit, AnnotationSynchronizer, Segment, SimilarityLink, SubmittedAnnotation};
pub use time::Seconds;
