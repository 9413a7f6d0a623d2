//! HTTP surface end-to-end tests (§6 External Interfaces).
//!
//! Grounded on `interchain-indexer-server/tests/avalanche_e2e.rs`'s helper
//! shape (spawn the real `run()` against a disposable test database, poll
//! the health route until it answers, then exercise the API with `reqwest`)
//! but scoped to the parts of the surface that don't require a live chain:
//! health, status, and the control-plane mutation routes against an
//! otherwise-idle indexer.

mod helpers;

use serde_json::{Value, json};

#[tokio::test]
async fn healthz_reports_healthy_with_no_queue_activity() {
    let db = helpers::init_db("crate_indexer_server", "healthz_reports_healthy").await;
    let base = helpers::init_indexer_server(db.db_url(), |s| s).await;

    let body: Value = reqwest::get(base.join("healthz").unwrap())
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "healthy");
    assert!(body["reasons"].as_array().unwrap().is_empty());
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn task_status_reports_full_snapshot() {
    let db = helpers::init_db("crate_indexer_server", "task_status_reports_snapshot").await;
    let base = helpers::init_indexer_server(db.db_url(), |s| s).await;

    let body: Value = reqwest::get(base.join("v1/tasks/status").unwrap())
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["mode"], "healthy");
    assert!(body["queues"].as_array().unwrap().len() >= 2);
    assert!(body["active_alerts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn indexer_status_lists_configured_streams() {
    let db = helpers::init_db("crate_indexer_server", "indexer_status_lists_streams").await;
    let base = helpers::init_indexer_server(db.db_url(), |s| s).await;

    let body: Value = reqwest::get(base.join("v1/indexer/status").unwrap())
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let streams = body["streams"].as_array().unwrap();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0]["contestId"], "contest-alpha");
    assert_eq!(streams[0]["chainId"], 1);
    assert_eq!(streams[0]["enabled"], true);
}

#[tokio::test]
async fn schedule_replay_rejects_unknown_stream() {
    let db = helpers::init_db("crate_indexer_server", "schedule_replay_rejects_unknown").await;
    let base = helpers::init_indexer_server(db.db_url(), |s| s).await;

    let response = reqwest::Client::new()
        .post(base.join("v1/indexer/replays").unwrap())
        .json(&json!({
            "contestId": "does-not-exist",
            "chainId": 999,
            "fromBlock": "0",
            "toBlock": "10",
            "reason": "backfill test",
        }))
        .send()
        .await
        .unwrap();

    assert!(!response.status().is_success());
}

#[tokio::test]
async fn set_mode_rejects_unknown_mode_string() {
    let db = helpers::init_db("crate_indexer_server", "set_mode_rejects_unknown").await;
    let base = helpers::init_indexer_server(db.db_url(), |s| s).await;

    let response = reqwest::Client::new()
        .post(base.join("v1/tasks/milestones/actions/mode").unwrap())
        .json(&json!({
            "contestId": "contest-alpha",
            "chainId": 1,
            "mode": "sleeping",
            "actor": "test-suite",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn retry_rejects_unknown_milestone_kind() {
    let db = helpers::init_db("crate_indexer_server", "retry_rejects_unknown_milestone").await;
    let base = helpers::init_indexer_server(db.db_url(), |s| s).await;

    let response = reqwest::Client::new()
        .post(base.join("v1/tasks/milestones/actions/retry").unwrap())
        .json(&json!({
            "contestId": "contest-alpha",
            "chainId": 1,
            "milestone": "not_a_real_milestone",
            "sourceTxHash": "0xabc",
            "sourceLogIndex": 0,
            "actor": "test-suite",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
}
