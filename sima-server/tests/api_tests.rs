//! Integration tests for sima-server API endpoints
//!
//! Tests cover:
//! - Health endpoint (no user required)
//! - Acting user resolution from the X-Sima-User header
//! - Task view and submission
//! - Sound and exercise downloads
//! - Error mapping to HTTP status codes

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::{json, Value};
use sima_common::db::annotations::{self, NewAnnotation};
use sima_common::db::models::{Exercise, Sound, Tier, User};
use sima_common::db::tiers::{self, NewTier};
use sima_common::db::{exercises, init_in_memory, sounds, users};
use sima_common::Seconds;
use sqlx::SqlitePool;
use tower::util::ServiceExt; // for `oneshot` method
use sima_server::{build_router, AppState};

struct TestData {
    pool: SqlitePool,
    exercise: Exercise,
    reference: Sound,
    sound: Sound,
    tier: Tier,
    user: User,
}

/// Test helper: in-memory database with one exercise, a reference sound
/// carrying two segments on tier "note", and an empty student sound
async fn setup_test_db() -> TestData {
    let pool = init_in_memory().await.expect("Should create in-memory database");
    let mut conn = pool.acquire().await.unwrap();

    let data_set = exercises::create_data_set(&mut conn, "camut").await.unwrap();
    let exercise = exercises::create_exercise(&mut conn, data_set.id, "scales").await.unwrap();
    let reference = sounds::create_sound(&mut conn, exercise.id, "ref.wav", "ref.wav").await.unwrap();
    let sound = sounds::create_sound(&mut conn, exercise.id, "take.wav", "take.wav").await.unwrap();
    exercises::set_reference_sound(&mut conn, exercise.id, Some(reference.id)).await.unwrap();
    let tier = tiers::create_tier(&mut conn, &NewTier::new(exercise.id, "note")).await.unwrap();
    tiers::add_tier_tag(&mut conn, tier.id, "pitch").await.unwrap();
    let user = users::create_user(&mut conn, "annotator", false).await.unwrap();

    for (start, end) in [(1000, 2000), (3000, 4000)] {
        annotations::insert_annotation(
            &mut conn,
            &NewAnnotation {
                sound_id: reference.id,
                tier_id: tier.id,
                start: Seconds::from_millis(start),
                end: Seconds::from_millis(end),
                name: "ref",
                user_id: user.id,
            },
        )
        .await
        .unwrap();
    }
    drop(conn);

    TestData {
        pool,
        exercise,
        reference,
        sound,
        tier,
        user,
    }
}

/// Test helper: Create app with test state
fn setup_app(db: SqlitePool) -> axum::Router {
    build_router(AppState::new(db, "/media/"))
}

/// Test helper: Request on behalf of `user`
fn user_request(method: &str, uri: &str, user: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-Sima-User", user);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

fn task_uri(data: &TestData) -> String {
    format!("/api/sounds/{}/tiers/{}/task", data.sound.id, data.tier.id)
}

// =============================================================================
// Health and identity
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_user_required() {
    let data = setup_test_db().await;
    let app = setup_app(data.pool);

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "sima-server");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_missing_user_header_is_unauthorized() {
    let data = setup_test_db().await;
    let uri = task_uri(&data);
    let app = setup_app(data.pool);

    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_unknown_user_is_unauthorized() {
    let data = setup_test_db().await;
    let uri = task_uri(&data);
    let app = setup_app(data.pool);

    let response = app.oneshot(user_request("GET", &uri, "mallory", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Task view and submission
// =============================================================================

#[tokio::test]
async fn test_get_task_returns_reference_and_user_segments() {
    let data = setup_test_db().await;
    let uri = task_uri(&data);
    let app = setup_app(data.pool.clone());

    let response = app.oneshot(user_request("GET", &uri, "annotator", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    let task = &body["task"];
    assert_eq!(task["segments_ref"].as_array().unwrap().len(), 2);
    assert_eq!(task["segments_ref"][0]["start"], 1.0);
    assert_eq!(task["segments_ref"][0]["annotation"], "ref");
    assert_eq!(task["segments"], json!([]));
    assert_eq!(task["url"], "/media/take.wav");
    assert_eq!(task["url_ref"], "/media/ref.wav");
    assert_eq!(task["tags"], json!(["pitch"]));
    assert_eq!(task["point_annotations"], false);
}

#[tokio::test]
async fn test_post_task_reconciles_and_reports_state() {
    let data = setup_test_db().await;
    let uri = task_uri(&data);
    let app = setup_app(data.pool.clone());

    let submission = json!({"annotations": [
        {"id": null, "start": 1, "end": 2, "annotation": "x", "similarity": "no"}
    ]});
    let response = app
        .clone()
        .oneshot(user_request("POST", &uri, "annotator", Some(submission)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["annotation_state"], "incomplete");

    // The new segment shows up in the task view
    let response = app
        .clone()
        .oneshot(user_request("GET", &uri, "annotator", None))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    let segment = &body["task"]["segments"][0];
    assert_eq!(segment["annotation"], "x");
    let id = segment["id"].as_i64().unwrap();

    let ref_id = body["task"]["segments_ref"][0]["id"].as_i64().unwrap();
    let submission = json!({"annotations": [
        {"id": id, "start": 1, "end": 2, "annotation": "x", "similarity": "yes",
         "reference": ref_id, "similValue": {"value": 1}},
        {"id": null, "start": "3.000", "end": "4.000", "annotation": "y", "similarity": "no"}
    ]});
    let response = app
        .clone()
        .oneshot(user_request("POST", &uri, "annotator", Some(submission)))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["annotation_state"], "complete");

    let response = app.oneshot(user_request("GET", &uri, "annotator", None)).await.unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["task"]["segments"][0]["similarity"], 1);
    assert_eq!(body["task"]["segments"][0]["reference"], ref_id);
}

#[tokio::test]
async fn test_post_task_validation_error_is_bad_request() {
    let data = setup_test_db().await;
    let uri = task_uri(&data);
    let app = setup_app(data.pool);

    let submission = json!({"annotations": [{"start": 5, "end": 1}]});
    let response = app
        .oneshot(user_request("POST", &uri, "annotator", Some(submission)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_post_task_unknown_reference_is_bad_request() {
    let data = setup_test_db().await;
    let uri = task_uri(&data);
    let app = setup_app(data.pool);

    let submission = json!({"annotations": [
        {"start": 1, "end": 2, "similarity": "yes", "reference": 123456}
    ]});
    let response = app
        .oneshot(user_request("POST", &uri, "annotator", Some(submission)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "REFERENCE_ERROR");
}

#[tokio::test]
async fn test_tier_of_other_exercise_is_conflict() {
    let data = setup_test_db().await;
    let other_tier = {
        let mut conn = data.pool.acquire().await.unwrap();
        let other = exercises::create_exercise(&mut conn, data.exercise.data_set_id, "arpeggios")
            .await
            .unwrap();
        tiers::create_tier(&mut conn, &NewTier::new(other.id, "note")).await.unwrap()
    };
    let uri = format!("/api/sounds/{}/tiers/{}/task", data.sound.id, other_tier.id);
    let app = setup_app(data.pool);

    let response = app.oneshot(user_request("GET", &uri, "annotator", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_sound_is_not_found() {
    let data = setup_test_db().await;
    let uri = format!("/api/sounds/9999/tiers/{}/task", data.tier.id);
    let app = setup_app(data.pool);

    let response = app
        .clone()
        .oneshot(user_request("GET", &uri, "annotator", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(user_request("POST", &uri, "annotator", Some(json!({"annotations": []}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Downloads
// =============================================================================

#[tokio::test]
async fn test_download_sound_groups_by_tier() {
    let data = setup_test_db().await;
    let uri = format!("/api/sounds/{}/annotations", data.reference.id);
    let app = setup_app(data.pool);

    let response = app.oneshot(user_request("GET", &uri, "annotator", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(
        body,
        json!({"note": [
            {"start_time": 1.0, "end_time": 2.0, "name": "ref"},
            {"start_time": 3.0, "end_time": 4.0, "name": "ref"}
        ]})
    );
}

#[tokio::test]
async fn test_download_exercise_is_an_attachment() {
    let data = setup_test_db().await;
    let uri = format!("/api/exercises/{}/annotations", data.exercise.id);
    let app = setup_app(data.pool);

    let response = app.oneshot(user_request("GET", &uri, data.user.username.as_str(), None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"scales.json\""
    );

    let body = extract_json(response.into_body()).await;
    let reference_tiers = &body["ref.wav"]["note"];
    assert_eq!(reference_tiers.as_object().unwrap().len(), 2);
    assert!(reference_tiers.as_object().unwrap().values().all(|a| a["similarity"].is_null()));
    assert_eq!(body["take.wav"]["note"], json!({}));
}

#[tokio::test]
async fn test_download_unknown_exercise_is_not_found() {
    let data = setup_test_db().await;
    let app = setup_app(data.pool);

    let response = app
        .oneshot(user_request("GET", "/api/exercises/4242/annotations", "annotator", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
