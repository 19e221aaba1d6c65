//! Shared fixture for integration tests
//!
//! One data set with one exercise whose reference sound is `reference`,
//! a second sound to annotate and a non-staff user.

#![allow(dead_code)]

use serde_json::Value;
use sima_common::db::annotations::{self, NewAnnotation};
use sima_common::db::models::{Annotation, AnnotationState, Exercise, Sound, Tier, User};
use sima_common::db::tiers::NewTier;
use sima_common::db::{exercises, init_in_memory, sounds, tiers, users};
use sima_common::{AnnotationSynchronizer, Seconds, SubmittedAnnotation};
use sqlx::SqlitePool;

pub struct Fixture {
    pub pool: SqlitePool,
    pub exercise: Exercise,
    pub reference: Sound,
    pub sound: Sound,
    pub user: User,
}

impl Fixture {
    pub async fn new() -> Self {
        let pool = init_in_memory().await.expect("Should open in-memory database");
        let mut conn = pool.acquire().await.unwrap();

        let data_set = exercises::create_data_set(&mut conn, "camut").await.unwrap();
        let exercise = exercises::create_exercise(&mut conn, data_set.id, "exercise_1").await.unwrap();
        let reference = sounds::create_sound(&mut conn, exercise.id, "reference.wav", "import/reference.wav")
            .await
            .unwrap();
        let sound = sounds::create_sound(&mut conn, exercise.id, "student.wav", "import/student.wav")
            .await
            .unwrap();
        exercises::set_reference_sound(&mut conn, exercise.id, Some(reference.id))
            .await
            .unwrap();
        let user = users::create_user(&mut conn, "annotator", false).await.unwrap();
        exercises::add_data_set_user(&mut conn, data_set.id, user.id).await.unwrap();
        drop(conn);

        let exercise = Exercise {
            reference_sound_id: Some(reference.id),
            ..exercise
        };
        Self {
            pool,
            exercise,
            reference,
            sound,
            user,
        }
    }

    pub fn synchronizer(&self) -> AnnotationSynchronizer {
        AnnotationSynchronizer::new(self.pool.clone())
    }

    pub async fn tier(&self, tier: NewTier) -> Tier {
        let mut conn = self.pool.acquire().await.unwrap();
        tiers::create_tier(&mut conn, &tier).await.unwrap()
    }

    pub async fn new_sound(&self, filename: &str) -> Sound {
        let mut conn = self.pool.acquire().await.unwrap();
        sounds::create_sound(&mut conn, self.exercise.id, filename, filename)
            .await
            .unwrap()
    }

    /// Insert a row directly, bypassing synchronization
    pub async fn annotate(&self, sound_id: i64, tier_id: i64, start_ms: i64, end_ms: i64, name: &str) -> Annotation {
        let mut conn = self.pool.acquire().await.unwrap();
        annotations::insert_annotation(
            &mut conn,
            &NewAnnotation {
                sound_id,
                tier_id,
                start: Seconds::from_millis(start_ms),
                end: Seconds::from_millis(end_ms),
                name,
                user_id: self.user.id,
            },
        )
        .await
        .unwrap()
    }

    pub async fn annotations(&self, sound_id: i64, tier_id: i64) -> Vec<Annotation> {
        let mut conn = self.pool.acquire().await.unwrap();
        annotations::list_annotations(&mut conn, sound_id, tier_id).await.unwrap()
    }

    /// `(start_ms, end_ms, name)` of a pair, sorted
    pub async fn rows(&self, sound_id: i64, tier_id: i64) -> Vec<(i64, i64, String)> {
        let mut rows: Vec<_> = self
            .annotations(sound_id, tier_id)
            .await
            .into_iter()
            .map(|a| (a.start.millis(), a.end.millis(), a.name))
            .collect();
        rows.sort();
        rows
    }

    pub async fn stored_state(&self, sound_id: i64) -> AnnotationState {
        let mut conn = self.pool.acquire().await.unwrap();
        sounds::get_sound(&mut conn, sound_id)
            .await
            .unwrap()
            .expect("sound exists")
            .annotation_state
    }
}

/// Parse a front-end record
pub fn record(value: Value) -> SubmittedAnnotation {
    serde_json::from_value(value).expect("Should parse submitted annotation")
}

pub fn row(start_ms: i64, end_ms: i64, name: &str) -> (i64, i64, String) {
    (start_ms, end_ms, name.to_string())
}
