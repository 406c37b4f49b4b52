//! End-to-end coordinator tests.
//!
//! Exercises the full HTTP surface against a file-backed store: submission
//! through the hand-off and queue writer, capability-matched claiming,
//! racing claimers, worker-death recovery, and the data-quality issue
//! lifecycle.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use drover_coordinator::store::{DeadLetterStore, JobStore};
use drover_coordinator::{api, AppState, QueueWriter, ReclamationLoop, SubmissionQueue};
use drover_db::{create_pool, init_schema, DbConfig, DbPool};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestCoordinator {
    router: Router,
    pool: DbPool,
    reaper: ReclamationLoop,
    _dir: TempDir,
}

async fn coordinator() -> TestCoordinator {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("drover.db");
    let pool = create_pool(DbConfig::sqlite(db_path.to_string_lossy()))
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();

    let (submissions, handoff_rx) = SubmissionQueue::new(64, 3);
    let writer = QueueWriter::new(
        handoff_rx,
        JobStore::new(pool.clone()),
        DeadLetterStore::new(pool.clone()),
        5,
    );
    tokio::spawn(writer.run());

    let reaper = ReclamationLoop::new(
        pool.clone(),
        Duration::from_secs(300),
        Duration::from_secs(30),
    );

    let router = api::router(AppState::new(pool.clone(), submissions));
    TestCoordinator {
        router,
        pool,
        reaper,
        _dir: dir,
    }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    send(router, "GET", uri, None).await
}

async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(router, "POST", uri, Some(body)).await
}

/// Submit a job and wait for the queue writer to persist it.
async fn submit_and_persist(router: &Router, body: Value) -> String {
    let (status, response) = post(router, "/jobs/submit", body).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(response["status"], "queued");
    let job_id = response["job_id"].as_str().unwrap().to_string();

    // The 202 means "accepted into the hand-off"; poll the query surface
    // until the asynchronous write lands.
    for _ in 0..100 {
        let (status, _) = get(router, &format!("/jobs/{job_id}/status")).await;
        if status == StatusCode::OK {
            return job_id;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} was never persisted");
}

async fn claim(router: &Router, worker_id: &str, capabilities: &[&str]) -> (StatusCode, Value) {
    post(
        router,
        "/jobs/claim",
        json!({"worker_id": worker_id, "capabilities": capabilities}),
    )
    .await
}

async fn silence_worker(pool: &DbPool, worker_id: &str) {
    let stale = Utc::now() - chrono::Duration::seconds(600);
    sqlx::query("UPDATE workers SET last_heartbeat = ? WHERE worker_id = ?")
        .bind(stale)
        .bind(worker_id)
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn health_probe() {
    let ctx = coordinator().await;
    let (status, body) = get(&ctx.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

// S1: submit -> claim -> heartbeat -> checkpoint -> complete.
#[tokio::test]
async fn happy_path() {
    let ctx = coordinator().await;
    let job_id =
        submit_and_persist(&ctx.router, json!({"job_type": "x", "config": {"k": 1}})).await;

    let (status, claimed) = claim(&ctx.router, "W1", &["x"]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(claimed["job_id"], job_id.as_str());
    assert_eq!(claimed["job_type"], "x");
    assert_eq!(claimed["config"], json!({"k": 1}));
    assert!(claimed["created_at"].is_string());
    // Advisory record of the server-side transition.
    assert_eq!(claimed["transition"]["from"], "pending");
    assert_eq!(claimed["transition"]["to"], "claimed");
    assert_eq!(claimed["transition"]["worker_id"], "W1");

    let (status, beat) = post(
        &ctx.router,
        &format!("/jobs/{job_id}/heartbeat"),
        json!({"worker_id": "W1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(beat["status"], "claimed");

    let (status, started) = post(
        &ctx.router,
        &format!("/jobs/{job_id}/start"),
        json!({"worker_id": "W1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["status"], "running");

    let (status, _) = post(
        &ctx.router,
        &format!("/jobs/{job_id}/checkpoint"),
        json!({"worker_id": "W1", "checkpoint": {"n": 100}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, done) = post(
        &ctx.router,
        &format!("/jobs/{job_id}/complete"),
        json!({"worker_id": "W1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "completed");

    let (status, detail) = get(&ctx.router, &format!("/jobs/{job_id}/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["job"]["status"], "completed");
    assert_eq!(detail["job"]["checkpoint"], json!({"n": 100}));
    assert_eq!(detail["job"]["worker_id"], "W1");
    assert!(detail["job"]["completed_at"].is_string());
    assert_eq!(detail["worker"]["worker_id"], "W1");
}

// S2: capability mismatch gets no work; a capable worker gets the job.
#[tokio::test]
async fn capability_mismatch() {
    let ctx = coordinator().await;
    let job_id = submit_and_persist(&ctx.router, json!({"job_type": "x"})).await;

    let (status, _) = claim(&ctx.router, "W2", &["y"]).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, claimed) = claim(&ctx.router, "W3", &["x", "y"]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(claimed["job_id"], job_id.as_str());
}

// S3: two racing claimers; exactly one wins.
#[tokio::test]
async fn racing_claimers() {
    let ctx = coordinator().await;
    let job_id = submit_and_persist(&ctx.router, json!({"job_type": "x"})).await;

    let (first, second) = tokio::join!(
        claim(&ctx.router, "W1", &["x"]),
        claim(&ctx.router, "W2", &["x"])
    );

    let statuses = [first.0, second.0];
    assert!(statuses.contains(&StatusCode::OK));
    assert!(statuses.contains(&StatusCode::NO_CONTENT));

    let winner = if first.0 == StatusCode::OK { first.1 } else { second.1 };
    assert_eq!(winner["job_id"], job_id.as_str());
}

// S4: worker death with retry budget; the job is reclaimed and completed by
// another worker.
#[tokio::test]
async fn worker_death_with_retry() {
    let ctx = coordinator().await;
    let job_id = submit_and_persist(
        &ctx.router,
        json!({"job_type": "x", "max_retries": 1}),
    )
    .await;

    let (status, _) = claim(&ctx.router, "W1", &["x"]).await;
    assert_eq!(status, StatusCode::OK);

    silence_worker(&ctx.pool, "W1").await;
    ctx.reaper.pass().await.unwrap();

    let (_, detail) = get(&ctx.router, &format!("/jobs/{job_id}/status")).await;
    assert_eq!(detail["job"]["status"], "pending");
    assert_eq!(detail["job"]["retry_count"], 1);
    assert_eq!(detail["job"]["worker_id"], Value::Null);

    let (status, reclaimed) = claim(&ctx.router, "W2", &["x"]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reclaimed["job_id"], job_id.as_str());
    assert_eq!(reclaimed["retry_count"], 1);

    post(
        &ctx.router,
        &format!("/jobs/{job_id}/start"),
        json!({"worker_id": "W2"}),
    )
    .await;
    let (status, done) = post(
        &ctx.router,
        &format!("/jobs/{job_id}/complete"),
        json!({"worker_id": "W2"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "completed");
}

// S5: worker death with the budget exhausted; terminal failure mentioning
// unresponsiveness.
#[tokio::test]
async fn worker_death_exhausted() {
    let ctx = coordinator().await;
    let job_id = submit_and_persist(
        &ctx.router,
        json!({"job_type": "x", "max_retries": 0}),
    )
    .await;

    claim(&ctx.router, "W1", &["x"]).await;
    silence_worker(&ctx.pool, "W1").await;
    ctx.reaper.pass().await.unwrap();

    let (_, detail) = get(&ctx.router, &format!("/jobs/{job_id}/status")).await;
    assert_eq!(detail["job"]["status"], "failed");
    assert!(detail["job"]["error_message"]
        .as_str()
        .unwrap()
        .contains("unresponsive"));

    // The worker's late completion is rejected and its result discarded.
    let (status, body) = post(
        &ctx.router,
        &format!("/jobs/{job_id}/complete"),
        json!({"worker_id": "W1"}),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["error"], "precondition_failed");
}

// S6: data-quality issue lifecycle through resolution.
#[tokio::test]
async fn dq_issue_lifecycle() {
    let ctx = coordinator().await;
    let job_id = submit_and_persist(&ctx.router, json!({"job_type": "x"})).await;
    claim(&ctx.router, "W1", &["x"]).await;

    let (status, reported) = post(
        &ctx.router,
        &format!("/jobs/{job_id}/issues"),
        json!({
            "source_record_id": "row-88",
            "issue_type": "invalid_zip",
            "severity": "warning",
            "field_name": "zip",
            "invalid_value": "1478",
            "expected_format": "\\d{5}",
            "raw_record": {"zip": "1478"}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let issue_id = reported["issue_id"].as_str().unwrap().to_string();

    let (status, pending) = get(&ctx.router, "/data-quality/issues?status=pending").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["count"], 1);
    assert_eq!(pending["issues"][0]["issue_id"], issue_id.as_str());
    assert_eq!(pending["issues"][0]["invalid_value"], "1478");
    assert_eq!(pending["issues"][0]["job_id"], job_id.as_str());

    let (status, _) = post(
        &ctx.router,
        &format!("/data-quality/issues/{issue_id}/resolve"),
        json!({"resolution_status": "auto_fixed", "resolution_action": "auto_fix", "resolved_by": "admin"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, pending) = get(&ctx.router, "/data-quality/issues?status=pending").await;
    assert_eq!(pending["count"], 0);

    let (_, fixed) = get(&ctx.router, "/data-quality/issues?status=auto_fixed").await;
    assert_eq!(fixed["count"], 1);
    assert!(fixed["issues"][0]["resolved_at"].is_string());
}

// Property 2: transitions outside the lifecycle graph are rejected.
#[tokio::test]
async fn out_of_graph_transitions_are_rejected() {
    let ctx = coordinator().await;
    let job_id = submit_and_persist(&ctx.router, json!({"job_type": "x"})).await;

    // pending -> running must pass through claimed.
    let (status, _) = post(
        &ctx.router,
        &format!("/jobs/{job_id}/start"),
        json!({"worker_id": "W1"}),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);

    claim(&ctx.router, "W1", &["x"]).await;

    // claimed -> completed must pass through running.
    let (status, _) = post(
        &ctx.router,
        &format!("/jobs/{job_id}/complete"),
        json!({"worker_id": "W1"}),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);

    // A non-owner cannot report progress.
    let (status, _) = post(
        &ctx.router,
        &format!("/jobs/{job_id}/checkpoint"),
        json!({"worker_id": "W9", "checkpoint": {}}),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
}

// Property 5: identifiers from one process are lexicographically monotonic.
#[tokio::test]
async fn submission_ids_are_monotonic() {
    let ctx = coordinator().await;
    let (_, first) = post(&ctx.router, "/jobs/submit", json!({"job_type": "x"})).await;
    let (_, second) = post(&ctx.router, "/jobs/submit", json!({"job_type": "x"})).await;
    let (a, b) = (
        first["job_id"].as_str().unwrap(),
        second["job_id"].as_str().unwrap(),
    );
    assert_eq!(a.len(), 26);
    assert!(a < b, "{a} should sort before {b}");
}

#[tokio::test]
async fn cancelled_job_is_observed_by_its_owner() {
    let ctx = coordinator().await;
    let job_id = submit_and_persist(&ctx.router, json!({"job_type": "x"})).await;
    claim(&ctx.router, "W1", &["x"]).await;

    let (status, _) = post(
        &ctx.router,
        &format!("/jobs/{job_id}/cancel"),
        json!({"reason": "superseded"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The owner's next progress report sees the transition.
    let (status, beat) = post(
        &ctx.router,
        &format!("/jobs/{job_id}/heartbeat"),
        json!({"worker_id": "W1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(beat["status"], "cancelled");

    // Cancelling a terminal job conflicts.
    let (status, _) = post(&ctx.router, &format!("/jobs/{job_id}/cancel"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn validation_errors() {
    let ctx = coordinator().await;

    let (status, body) = post(&ctx.router, "/jobs/submit", json!({"job_type": ""})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_argument");

    let (status, body) = get(&ctx.router, "/jobs?status=bogus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("bogus"));

    let (status, _) = get(&ctx.router, "/jobs/unknown-job/status").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post(
        &ctx.router,
        "/jobs/claim",
        json!({"worker_id": "", "capabilities": ["x"]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_jobs_filters_by_status() {
    let ctx = coordinator().await;
    submit_and_persist(&ctx.router, json!({"job_type": "x"})).await;
    let second = submit_and_persist(&ctx.router, json!({"job_type": "x"})).await;
    claim(&ctx.router, "W1", &["x"]).await;

    let (status, pending) = get(&ctx.router, "/jobs?status=pending").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["count"], 1);
    assert_eq!(pending["jobs"][0]["job_id"], second.as_str());

    let (_, claimed) = get(&ctx.router, "/jobs?status=claimed").await;
    assert_eq!(claimed["count"], 1);

    let (_, all) = get(&ctx.router, "/jobs").await;
    assert_eq!(all["count"], 2);
}

#[tokio::test]
async fn worker_registry_tracks_liveness() {
    let ctx = coordinator().await;

    // Heartbeat before any claim registers the worker.
    let (status, beat) = post(
        &ctx.router,
        "/workers/heartbeat",
        json!({
            "worker_id": "W1",
            "hostname": "edge-01",
            "capabilities": ["x"],
            "metadata": {"cpu": 0.3}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(beat["status"], "active");

    let (_, workers) = get(&ctx.router, "/workers").await;
    assert_eq!(workers["count"], 1);
    assert_eq!(workers["workers"][0]["worker_id"], "W1");
    assert_eq!(workers["workers"][0]["capabilities"], json!(["x"]));

    // Liveness convergence: silent beyond the threshold, offline after the
    // next pass and gone from the live listing.
    silence_worker(&ctx.pool, "W1").await;
    ctx.reaper.pass().await.unwrap();
    let (_, workers) = get(&ctx.router, "/workers").await;
    assert_eq!(workers["count"], 0);
}

#[tokio::test]
async fn worker_logs_are_stored_verbatim() {
    let ctx = coordinator().await;
    let job_id = submit_and_persist(&ctx.router, json!({"job_type": "x"})).await;

    let (status, _) = post(
        &ctx.router,
        &format!("/jobs/{job_id}/logs"),
        json!({
            "worker_id": "W1",
            "level": "INFO",
            "message": "parsed 512 rows",
            "context": {"batch": 3}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, logs) = get(&ctx.router, &format!("/jobs/{job_id}/logs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logs["count"], 1);
    assert_eq!(logs["logs"][0]["level"], "INFO");
    assert_eq!(logs["logs"][0]["context"], json!({"batch": 3}));
}

#[tokio::test]
async fn checkpoint_overwrites_last_write_wins() {
    let ctx = coordinator().await;
    let job_id = submit_and_persist(&ctx.router, json!({"job_type": "x"})).await;
    claim(&ctx.router, "W1", &["x"]).await;
    post(
        &ctx.router,
        &format!("/jobs/{job_id}/start"),
        json!({"worker_id": "W1"}),
    )
    .await;

    for n in [10, 20, 30] {
        let (status, _) = post(
            &ctx.router,
            &format!("/jobs/{job_id}/checkpoint"),
            json!({"worker_id": "W1", "checkpoint": {"n": n}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, detail) = get(&ctx.router, &format!("/jobs/{job_id}/status")).await;
    assert_eq!(detail["job"]["checkpoint"], json!({"n": 30}));
}

// A claim response that raced with worker death: the job stays claimed with
// no started_at until the reclamation pass recovers it.
#[tokio::test]
async fn claim_response_race_with_worker_death() {
    let ctx = coordinator().await;
    let job_id = submit_and_persist(
        &ctx.router,
        json!({"job_type": "x", "max_retries": 1}),
    )
    .await;
    claim(&ctx.router, "W1", &["x"]).await;

    // W1 dies before reporting start; no heartbeat ever arrives.
    let (_, detail) = get(&ctx.router, &format!("/jobs/{job_id}/status")).await;
    assert_eq!(detail["job"]["status"], "claimed");
    assert_eq!(detail["job"]["started_at"], Value::Null);

    silence_worker(&ctx.pool, "W1").await;
    ctx.reaper.pass().await.unwrap();

    let (_, detail) = get(&ctx.router, &format!("/jobs/{job_id}/status")).await;
    assert_eq!(detail["job"]["status"], "pending");
    assert_eq!(detail["job"]["retry_count"], 1);
}
