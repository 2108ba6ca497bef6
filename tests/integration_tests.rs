//! Integration tests for the LexVault Backup Server API
//!
//! These tests verify the complete request/response cycle for all
//! endpoints, plus the scheduler tick and cascade-delete guarantees.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::get,
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use lexvault_backup_server::models::BackupStatus;
use lexvault_backup_server::routes::*;
use lexvault_backup_server::{open_database, scheduler, store, AppState, Config, Db};

// =============================================================================
// Test Helpers
// =============================================================================

/// Create a test configuration rooted in a temporary directory
fn test_config(temp_dir: &TempDir) -> Config {
    Config {
        server_host: "127.0.0.1".to_string(),
        server_port: 0, // Random port
        database_path: temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string(),
        data_dir: temp_dir.path().join("data").to_string_lossy().to_string(),
        artifact_dir: temp_dir
            .path()
            .join("artifacts")
            .to_string_lossy()
            .to_string(),
        allowed_origins: vec!["http://localhost:5173".to_string()],
        execution_timeout_secs: 30,
        delete_stop_wait_secs: 1,
        tick_interval_secs: 60,
        environment: "test".to_string(),
        backup_secret_key: "test-secret-key".to_string(),
    }
}

/// Seed the data directory with a small file tree to back up
fn seed_data_dir(config: &Config) {
    let root = std::path::Path::new(&config.data_dir);
    std::fs::create_dir_all(root.join("cases/1042")).unwrap();
    std::fs::write(root.join("readme.txt"), b"lexvault case archive").unwrap();
    std::fs::write(
        root.join("cases/1042/filing.pdf"),
        b"filing contents ".repeat(64),
    )
    .unwrap();
    std::fs::write(root.join("cases/notes.tmp"), b"scratch notes").unwrap();
}

/// Create application state backed by a fresh temp database
fn create_test_state(temp_dir: &TempDir) -> AppState {
    let config = test_config(temp_dir);
    seed_data_dir(&config);
    let db = open_database(&config.database_path).expect("Failed to create test database");
    AppState::new(db, config)
}

/// Create a test app router
fn create_test_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/admin/backup",
            get(list_backups).post(create_backup).delete(delete_backup),
        )
        .route(
            "/admin/backup/schedule",
            get(list_schedules)
                .post(upsert_schedule)
                .delete(delete_schedule),
        )
        .with_state(state)
}

/// Request body for creating a backup job
fn backup_body(
    backup_type: &str,
    compression: &str,
    encryption: bool,
    excluded: &[&str],
    max_concurrent: i64,
) -> String {
    json!({
        "type": backup_type,
        "settings": {
            "compression": compression,
            "encryption": encryption,
            "excludedPaths": excluded,
            "maxConcurrent": max_concurrent
        }
    })
    .to_string()
}

/// Parse response body as JSON
async fn body_to_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Create a POST request with JSON body
fn make_post_request(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

/// Create a GET request
fn make_get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Create a DELETE request
fn make_delete_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Poll a job until it reaches a terminal status
async fn wait_for_terminal(db: &Db, id: &str) -> BackupStatus {
    for _ in 0..200 {
        if let Some(status) = store::get_status(db, id).unwrap() {
            if status.is_terminal() {
                return status;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("Backup {} did not reach a terminal status", id);
}

/// Create a backup through the API and return its id
async fn create_backup_via_api(state: &AppState, body: String) -> String {
    let app = create_test_app(state.clone());
    let response = app
        .oneshot(make_post_request("/admin/backup", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    body["id"].as_str().unwrap().to_string()
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check_returns_healthy() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);
    let app = create_test_app(state);

    let response = app.oneshot(make_get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
    assert!(body["version"].as_str().is_some());
}

// =============================================================================
// Backup Creation Tests
// =============================================================================

#[tokio::test]
async fn test_create_backup_returns_pending_record() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);
    let app = create_test_app(state);

    let response = app
        .oneshot(make_post_request(
            "/admin/backup",
            backup_body("FULL", "MEDIUM", false, &[], 2),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["type"], "FULL");
    assert_eq!(body["name"], "Manual backup");
    assert!(body["id"].as_str().is_some());
    assert!(body["createdAt"].as_str().is_some());
}

#[tokio::test]
async fn test_create_backup_rejects_bad_compression() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);
    let app = create_test_app(state);

    let response = app
        .oneshot(make_post_request(
            "/admin/backup",
            backup_body("FULL", "ULTRA", false, &[], 1),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_backup_rejects_zero_max_concurrent() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);
    let app = create_test_app(state);

    let response = app
        .oneshot(make_post_request(
            "/admin/backup",
            backup_body("FULL", "LOW", false, &[], 0),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_backup_rejects_malformed_excluded_path() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);
    let app = create_test_app(state);

    let response = app
        .oneshot(make_post_request(
            "/admin/backup",
            backup_body("FULL", "LOW", false, &["../outside"], 1),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_backup_rejects_unknown_type() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);
    let app = create_test_app(state);

    let response = app
        .oneshot(make_post_request(
            "/admin/backup",
            backup_body("SNAPSHOT", "LOW", false, &[], 1),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Backup Execution Tests
// =============================================================================

#[tokio::test]
async fn test_completed_backup_records_encrypted_checksummed_files() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);

    let id = create_backup_via_api(
        &state,
        backup_body("FULL", "HIGH", true, &["*.tmp"], 1),
    )
    .await;

    let status = wait_for_terminal(&state.db, &id).await;
    assert_eq!(status, BackupStatus::Completed);

    let files = store::list_files(&state.db, &id).unwrap();
    assert!(!files.is_empty());
    for file in &files {
        assert_eq!(file.checksum.len(), 64);
        assert!(file.checksum.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(file.encrypted);
        assert!(file.size > 0);
    }

    // Excluded patterns are skipped, not errors
    assert!(files.iter().all(|f| !f.path.ends_with(".tmp")));
    assert!(files.iter().any(|f| f.path == "readme.txt"));

    // Artifacts land under the job's directory with the encrypted suffix
    let artifact = std::path::Path::new(&state.config.artifact_dir)
        .join(&id)
        .join("readme.txt.zst.enc");
    assert!(artifact.exists());
}

#[tokio::test]
async fn test_incremental_backup_skips_unchanged_units() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);

    let first = create_backup_via_api(&state, backup_body("FULL", "LOW", false, &[], 1)).await;
    assert_eq!(wait_for_terminal(&state.db, &first).await, BackupStatus::Completed);

    // Change one file, then run an incremental job
    std::fs::write(
        std::path::Path::new(&state.config.data_dir).join("readme.txt"),
        b"amended archive index",
    )
    .unwrap();

    let second =
        create_backup_via_api(&state, backup_body("INCREMENTAL", "LOW", false, &[], 1)).await;
    assert_eq!(wait_for_terminal(&state.db, &second).await, BackupStatus::Completed);

    let files = store::list_files(&state.db, &second).unwrap();
    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["readme.txt"]);
}

#[tokio::test]
async fn test_watchdog_failure_releases_slot() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir);
    seed_data_dir(&config);
    // Zero timeout: the watchdog fires before any unit completes
    config.execution_timeout_secs = 0;
    let db = open_database(&config.database_path).unwrap();
    let state = AppState::new(db, config);

    // Same settings profile with maxConcurrent = 1: the second job can
    // only run if the first one's forced failure released its slot
    let first = create_backup_via_api(&state, backup_body("FULL", "LOW", false, &[], 1)).await;
    let second = create_backup_via_api(&state, backup_body("FULL", "LOW", false, &[], 1)).await;

    assert_eq!(wait_for_terminal(&state.db, &first).await, BackupStatus::Failed);
    assert_eq!(wait_for_terminal(&state.db, &second).await, BackupStatus::Failed);
}

// =============================================================================
// Backup Listing Tests
// =============================================================================

#[tokio::test]
async fn test_list_backups_embeds_settings_and_recent_logs() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);

    let first = create_backup_via_api(&state, backup_body("FULL", "LOW", false, &[], 2)).await;
    wait_for_terminal(&state.db, &first).await;
    let second = create_backup_via_api(&state, backup_body("FULL", "HIGH", true, &[], 3)).await;
    wait_for_terminal(&state.db, &second).await;

    let app = create_test_app(state);
    let response = app
        .oneshot(make_get_request("/admin/backup"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_to_json(response.into_body()).await;
    let jobs = body.as_array().unwrap();
    assert_eq!(jobs.len(), 2);

    // Newest first
    let first_created = jobs[0]["createdAt"].as_str().unwrap();
    let second_created = jobs[1]["createdAt"].as_str().unwrap();
    assert!(first_created >= second_created);

    for job in jobs {
        assert!(job["settings"]["maxConcurrent"].as_i64().unwrap() >= 1);
        let logs = job["recentLogs"].as_array().unwrap();
        assert!(!logs.is_empty());
        assert!(logs.len() <= 10);
        assert!(logs[0]["message"].as_str().is_some());
    }
}

// =============================================================================
// Backup Deletion Tests
// =============================================================================

#[tokio::test]
async fn test_delete_backup_requires_id() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);
    let app = create_test_app(state);

    let response = app
        .oneshot(make_delete_request("/admin/backup"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_backup_unknown_id_returns_404() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);
    let app = create_test_app(state);

    let response = app
        .oneshot(make_delete_request("/admin/backup?id=no-such-backup"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_backup_cascades_all_rows() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);

    let id = create_backup_via_api(&state, backup_body("FULL", "LOW", false, &[], 1)).await;
    wait_for_terminal(&state.db, &id).await;
    assert!(!store::list_files(&state.db, &id).unwrap().is_empty());

    let app = create_test_app(state.clone());
    let response = app
        .oneshot(make_delete_request(&format!("/admin/backup?id={}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["success"], true);

    // Zero rows remain in any table for this id
    assert!(store::get_status(&state.db, &id).unwrap().is_none());
    assert!(store::load_job(&state.db, &id).unwrap().is_none());
    assert!(store::list_files(&state.db, &id).unwrap().is_empty());
    assert!(store::list_jobs(&state.db).unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_running_backup_force_fails_then_cascades() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);

    // Put a job into RUNNING without a live execution task; the delete
    // handshake must force-fail it and still remove every row
    let settings = json!({
        "compression": "LOW",
        "encryption": false,
        "excludedPaths": [],
        "maxConcurrent": 1
    });
    let settings: lexvault_backup_server::models::SettingsInput =
        serde_json::from_value(settings).unwrap();
    let settings = settings.validate().unwrap();
    let backup = store::create_job(
        &state.db,
        "stuck job",
        lexvault_backup_server::models::BackupType::Full,
        "admin",
        &settings,
        chrono::Utc::now().timestamp(),
    )
    .unwrap();
    assert!(store::mark_running(&state.db, &backup.id, chrono::Utc::now().timestamp()).unwrap());
    assert_eq!(
        store::get_status(&state.db, &backup.id).unwrap(),
        Some(BackupStatus::Running)
    );

    let app = create_test_app(state.clone());
    let response = app
        .oneshot(make_delete_request(&format!(
            "/admin/backup?id={}",
            backup.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(store::get_status(&state.db, &backup.id).unwrap().is_none());
    assert!(store::load_job(&state.db, &backup.id).unwrap().is_none());
    assert!(store::list_files(&state.db, &backup.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_backup_removes_referencing_schedule() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);

    let id = create_backup_via_api(&state, backup_body("FULL", "LOW", false, &[], 1)).await;
    wait_for_terminal(&state.db, &id).await;

    let app = create_test_app(state.clone());
    let response = app
        .oneshot(make_post_request(
            "/admin/backup/schedule",
            json!({
                "settingsId": id,
                "enabled": true,
                "frequency": "DAILY",
                "timeOfDay": "02:00"
            })
            .to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let app = create_test_app(state.clone());
    let response = app
        .oneshot(make_delete_request(&format!("/admin/backup?id={}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The schedule never outlives the settings profile it references
    assert!(store::list_schedules(&state.db).unwrap().is_empty());
}

// =============================================================================
// Schedule Tests
// =============================================================================

async fn upsert_schedule_response(
    state: &AppState,
    settings_id: &str,
    enabled: bool,
    time_of_day: &str,
) -> (StatusCode, Value) {
    let app = create_test_app(state.clone());
    let response = app
        .oneshot(make_post_request(
            "/admin/backup/schedule",
            json!({
                "settingsId": settings_id,
                "enabled": enabled,
                "frequency": "DAILY",
                "timeOfDay": time_of_day
            })
            .to_string(),
        ))
        .await
        .unwrap();
    let status = response.status();
    let body = body_to_json(response.into_body()).await;
    (status, body)
}

#[tokio::test]
async fn test_schedule_time_of_day_validation() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);
    let id = create_backup_via_api(&state, backup_body("FULL", "LOW", false, &[], 1)).await;
    wait_for_terminal(&state.db, &id).await;

    let (status, _) = upsert_schedule_response(&state, &id, true, "25:00").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = upsert_schedule_response(&state, &id, true, "23:59").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["nextRunAt"].as_str().is_some());

    let (status, _) = upsert_schedule_response(&state, &id, true, "00:00").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_schedule_unknown_settings_returns_404() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);

    let (status, _) = upsert_schedule_response(&state, "no-such-settings", true, "02:00").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_schedule_upsert_is_keyed_by_settings_id() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);
    let id = create_backup_via_api(&state, backup_body("FULL", "LOW", false, &[], 1)).await;
    wait_for_terminal(&state.db, &id).await;

    let (status, _) = upsert_schedule_response(&state, &id, true, "02:00").await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = upsert_schedule_response(&state, &id, true, "04:30").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["timeOfDay"], "04:30");

    // Second POST updated the single row, no duplicate
    let schedules = store::list_schedules(&state.db).unwrap();
    assert_eq!(schedules.len(), 1);

    let app = create_test_app(state.clone());
    let response = app
        .oneshot(make_get_request("/admin/backup/schedule"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    let listed = body.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["timeOfDay"], "04:30");
    assert!(listed[0]["settings"].is_object());
    assert!(listed[0]["backup"].is_object());
}

#[tokio::test]
async fn test_schedule_disable_clears_next_run() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);
    let id = create_backup_via_api(&state, backup_body("FULL", "LOW", false, &[], 1)).await;
    wait_for_terminal(&state.db, &id).await;

    let (_, body) = upsert_schedule_response(&state, &id, true, "02:00").await;
    assert!(body["nextRunAt"].as_str().is_some());

    let (_, body) = upsert_schedule_response(&state, &id, false, "02:00").await;
    assert!(body["nextRunAt"].is_null());
    assert_eq!(body["enabled"], false);
}

#[tokio::test]
async fn test_delete_schedule_requires_id_and_existence() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);

    let app = create_test_app(state.clone());
    let response = app
        .oneshot(make_delete_request("/admin/backup/schedule"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let app = create_test_app(state.clone());
    let response = app
        .oneshot(make_delete_request("/admin/backup/schedule?id=missing"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let id = create_backup_via_api(&state, backup_body("FULL", "LOW", false, &[], 1)).await;
    wait_for_terminal(&state.db, &id).await;
    upsert_schedule_response(&state, &id, true, "02:00").await;

    let app = create_test_app(state.clone());
    let response = app
        .oneshot(make_delete_request(&format!(
            "/admin/backup/schedule?id={}",
            id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(store::list_schedules(&state.db).unwrap().is_empty());
}

// =============================================================================
// Scheduler Tick Tests
// =============================================================================

#[tokio::test]
async fn test_tick_fires_due_schedule_once() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);
    let id = create_backup_via_api(&state, backup_body("FULL", "LOW", false, &[], 1)).await;
    wait_for_terminal(&state.db, &id).await;
    upsert_schedule_response(&state, &id, true, "02:00").await;

    // Two days from now every daily schedule is due
    let later = chrono::Utc::now().timestamp() + 2 * 86_400;
    let started = scheduler::tick(&state.db, &state.runner, later).await.unwrap();
    assert_eq!(started, 1);

    // The claim rewrote next_run_at, so an overlapping tick at the same
    // instant finds nothing to fire
    let started = scheduler::tick(&state.db, &state.runner, later).await.unwrap();
    assert_eq!(started, 0);

    let jobs = store::list_jobs(&state.db).unwrap();
    let scheduled: Vec<_> = jobs
        .iter()
        .filter(|job| job.backup.name == "Scheduled backup")
        .collect();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].backup.owner_id, "scheduler");

    // Re-armed strictly after the tick time
    let schedules = store::list_schedules(&state.db).unwrap();
    let next_run = schedules[0].schedule.next_run_at.as_ref().unwrap();
    let next_run = chrono::DateTime::parse_from_rfc3339(next_run).unwrap();
    assert!(next_run.timestamp() > later);
}

#[tokio::test]
async fn test_disabled_schedule_never_fires() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);
    let id = create_backup_via_api(&state, backup_body("FULL", "LOW", false, &[], 1)).await;
    wait_for_terminal(&state.db, &id).await;
    upsert_schedule_response(&state, &id, false, "02:00").await;

    // However much wall-clock passes, a disabled schedule stays inert
    let far_future = chrono::Utc::now().timestamp() + 365 * 86_400;
    let started = scheduler::tick(&state.db, &state.runner, far_future)
        .await
        .unwrap();
    assert_eq!(started, 0);
    assert_eq!(store::list_jobs(&state.db).unwrap().len(), 1);
}

#[tokio::test]
async fn test_reenabling_schedule_recomputes_from_now() {
    let temp_dir = TempDir::new().unwrap();
    let state = create_test_state(&temp_dir);
    let id = create_backup_via_api(&state, backup_body("FULL", "LOW", false, &[], 1)).await;
    wait_for_terminal(&state.db, &id).await;

    let (_, armed) = upsert_schedule_response(&state, &id, true, "02:00").await;
    upsert_schedule_response(&state, &id, false, "02:00").await;
    let (_, rearmed) = upsert_schedule_response(&state, &id, true, "02:00").await;

    let now = chrono::Utc::now().timestamp();
    for body in [&armed, &rearmed] {
        let next = body["nextRunAt"].as_str().unwrap();
        let next = chrono::DateTime::parse_from_rfc3339(next).unwrap();
        assert!(next.timestamp() > now - 5);
    }
}
