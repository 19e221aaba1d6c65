//! Integration tests for the data set batch operations
//!
//! Tests cover:
//! - Importing annotation files (tier creation, reference pairing, similarity)
//! - Exporting one JSON file per annotated sound
//! - Refreshing completion state across a data set

mod helpers;

use helpers::{record, row, Fixture};
use serde_json::{json, Value};
use sima_common::completion::{refresh_data_set, tier_state, CompletionSummary};
use sima_common::db::models::AnnotationState;
use sima_common::db::{similarities, sounds, tiers};
use sima_common::export::export_data_set;
use sima_common::import::import_directory;
use sima_common::Error;
use tempfile::TempDir;

fn write_annotation_file(dir: &TempDir, name: &str, content: Value) {
    std::fs::write(dir.path().join(name), serde_json::to_vec(&content).unwrap()).unwrap();
}

#[tokio::test]
async fn test_import_pairs_annotations_with_reference() {
    let fx = Fixture::new().await;
    let dir = TempDir::new().unwrap();
    write_annotation_file(
        &dir,
        "student.json",
        json!({"melody": [
            {"start_time": 1.2, "end_time": 2.0, "ref_start_time": 1.1, "ref_end_time": 2.1, "value": "3"}
        ]}),
    );
    write_annotation_file(&dir, "ghost.json", json!({"melody": []}));
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let summary = import_directory(&fx.pool, dir.path(), "annotator").await.unwrap();
    assert_eq!(summary.files, 1);
    assert_eq!(summary.annotations, 1);
    assert_eq!(summary.failed, vec![dir.path().join("ghost.json")]);

    let melody = {
        let mut conn = fx.pool.acquire().await.unwrap();
        tiers::find_tier_by_name(&mut conn, fx.exercise.id, "melody")
            .await
            .unwrap()
            .expect("tier created on import")
    };
    assert_eq!(fx.rows(fx.reference.id, melody.id).await, vec![row(1100, 2100, "")]);
    assert_eq!(fx.rows(fx.sound.id, melody.id).await, vec![row(1200, 2000, "")]);

    let annotated = fx.annotations(fx.sound.id, melody.id).await;
    let mut conn = fx.pool.acquire().await.unwrap();
    let links = similarities::list_similarities_for(&mut conn, annotated[0].id).await.unwrap();
    drop(conn);
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].values.get("value"), Some(&json!(3)));
    assert_eq!(links[0].user_id, fx.user.id);

    assert_eq!(fx.stored_state(fx.sound.id).await, AnnotationState::Complete);
}

#[tokio::test]
async fn test_import_requires_known_user() {
    let fx = Fixture::new().await;
    let dir = TempDir::new().unwrap();

    let result = import_directory(&fx.pool, dir.path(), "nobody").await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_import_from_missing_directory_is_io_error() {
    let fx = Fixture::new().await;
    let dir = TempDir::new().unwrap();

    let result = import_directory(&fx.pool, &dir.path().join("absent"), "annotator").await;
    assert!(matches!(result, Err(Error::Io(_))));
}

#[tokio::test]
async fn test_failed_file_leaves_no_partial_import() {
    let fx = Fixture::new().await;
    let dir = TempDir::new().unwrap();
    write_annotation_file(
        &dir,
        "student.json",
        json!({"melody": [
            {"start_time": 1, "end_time": 2, "ref_start_time": 1, "ref_end_time": 2, "value": 1},
            {"start_time": 1, "end_time": 2, "ref_start_time": 1, "ref_end_time": 2, "value": "high"}
        ]}),
    );

    let summary = import_directory(&fx.pool, dir.path(), "annotator").await.unwrap();
    assert_eq!(summary.files, 0);
    assert_eq!(summary.failed.len(), 1);

    let mut conn = fx.pool.acquire().await.unwrap();
    assert!(tiers::find_tier_by_name(&mut conn, fx.exercise.id, "melody").await.unwrap().is_none());
}

#[tokio::test]
async fn test_export_writes_one_file_per_annotated_sound() {
    let fx = Fixture::new().await;
    let import_dir = TempDir::new().unwrap();
    write_annotation_file(
        &import_dir,
        "student.json",
        json!({"melody": [
            {"start_time": 1.2, "end_time": 2.0, "ref_start_time": 1.1, "ref_end_time": 2.1, "value": 3}
        ]}),
    );
    import_directory(&fx.pool, import_dir.path(), "annotator").await.unwrap();

    fx.new_sound("silent.wav").await;
    let discarded = fx.new_sound("noise.wav").await;
    {
        let mut conn = fx.pool.acquire().await.unwrap();
        sounds::set_discarded(&mut conn, discarded.id, true).await.unwrap();
    }

    let out = TempDir::new().unwrap();
    let summary = export_data_set(&fx.pool, "camut", out.path()).await.unwrap();
    assert_eq!(summary.failed, 0);
    assert_eq!(
        summary.written,
        vec![out.path().join("student.json"), out.path().join("silent.json")]
    );
    assert!(!out.path().join("reference.json").exists());
    assert!(!out.path().join("noise.json").exists());

    let exported: Value = serde_json::from_slice(&std::fs::read(out.path().join("student.json")).unwrap()).unwrap();
    assert_eq!(
        exported,
        json!({"melody": [
            {"start_time": 1.2, "end_time": 2.0, "ref_start_time": 1.1, "ref_end_time": 2.1, "value": 3}
        ]})
    );
    let silent: Value = serde_json::from_slice(&std::fs::read(out.path().join("silent.json")).unwrap()).unwrap();
    assert_eq!(silent, json!({"melody": []}));
}

#[tokio::test]
async fn test_export_unknown_data_set_is_not_found() {
    let fx = Fixture::new().await;
    let out = TempDir::new().unwrap();

    assert!(matches!(
        export_data_set(&fx.pool, "missing", out.path()).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_refresh_data_set_recomputes_every_sound() {
    let fx = Fixture::new().await;
    let done = fx.tier(tiers::NewTier::new(fx.exercise.id, "done")).await;
    let pending = fx.tier(tiers::NewTier::new(fx.exercise.id, "pending")).await;

    // Reference: one segment on each tier
    let ref_done = fx.annotate(fx.reference.id, done.id, 1000, 2000, "").await;
    fx.annotate(fx.reference.id, pending.id, 1000, 2000, "").await;

    // student.wav completes "done" only
    let judged = fx.annotate(fx.sound.id, done.id, 1000, 2000, "").await;
    {
        let mut conn = fx.pool.acquire().await.unwrap();
        similarities::insert_similarity(&mut conn, ref_done.id, judged.id, fx.user.id, &serde_json::Map::new())
            .await
            .unwrap();
    }

    // finished.wav completes both
    let finished = fx.new_sound("finished.wav").await;
    for (tier, reference) in [(done.id, ref_done.id), (pending.id, ref_done.id)] {
        let annotation = fx.annotate(finished.id, tier, 1000, 2000, "").await;
        let mut conn = fx.pool.acquire().await.unwrap();
        similarities::insert_similarity(&mut conn, reference, annotation.id, fx.user.id, &serde_json::Map::new())
            .await
            .unwrap();
    }

    fx.new_sound("untouched.wav").await;
    let discarded = fx.new_sound("noise.wav").await;
    fx.annotate(discarded.id, done.id, 1000, 2000, "").await;
    {
        let mut conn = fx.pool.acquire().await.unwrap();
        sounds::set_discarded(&mut conn, discarded.id, true).await.unwrap();
    }

    let summary = refresh_data_set(&fx.pool, "camut").await.unwrap();
    assert_eq!(
        summary,
        CompletionSummary {
            empty: 1,
            incomplete: 1,
            complete: 1,
            discarded: 1,
        }
    );
    assert_eq!(fx.stored_state(fx.sound.id).await, AnnotationState::Incomplete);
    assert_eq!(fx.stored_state(finished.id).await, AnnotationState::Complete);
    assert_eq!(fx.stored_state(discarded.id).await, AnnotationState::Empty);
}

#[tokio::test]
async fn test_refresh_restates_submitted_tier_state_across_all_tiers() {
    let fx = Fixture::new().await;
    let melody = fx.tier(tiers::NewTier::new(fx.exercise.id, "melody")).await;
    let rhythm = fx.tier(tiers::NewTier::new(fx.exercise.id, "rhythm")).await;
    let ref_melody = fx.annotate(fx.reference.id, melody.id, 1000, 2000, "").await;
    fx.annotate(fx.reference.id, rhythm.id, 1000, 2000, "").await;

    // A submission stores the state of the submitted tier alone
    let state = fx
        .synchronizer()
        .apply(
            melody.id,
            fx.sound.id,
            vec![record(json!({"start": 1, "end": 2, "similarity": "yes", "reference": ref_melody.id}))],
            fx.user.id,
        )
        .await
        .unwrap();
    assert_eq!(state, AnnotationState::Complete);
    assert_eq!(fx.stored_state(fx.sound.id).await, AnnotationState::Complete);

    // A refresh stores the state over every tier; rhythm is still unannotated
    refresh_data_set(&fx.pool, "camut").await.unwrap();
    assert_eq!(fx.stored_state(fx.sound.id).await, AnnotationState::Incomplete);

    let mut conn = fx.pool.acquire().await.unwrap();
    assert_eq!(
        tier_state(&mut conn, &fx.sound, melody.id).await.unwrap(),
        AnnotationState::Complete
    );
    assert_eq!(tier_state(&mut conn, &fx.sound, rhythm.id).await.unwrap(), AnnotationState::Empty);
}
