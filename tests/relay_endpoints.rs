//! Integration tests for the withdrawal relay endpoints

use axum_test::TestServer;
use habitstake::amount::Amount;
use habitstake::relay::{build_relay_router, RelayState, ReserveBackend, ReserveConnector, TransferBackend};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const DEST: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";

fn server_with_reserve(reserve: i64) -> (TestServer, Arc<ReserveBackend>) {
    let backend = Arc::new(ReserveBackend::new("reserve://primary", Amount::from_num(reserve)));
    let state = RelayState::new(Some(backend.clone() as Arc<dyn TransferBackend>));
    let server = TestServer::new(build_relay_router(state)).expect("Failed to create test server");
    (server, backend)
}

#[tokio::test]
async fn test_withdraw_success() {
    let (server, backend) = server_with_reserve(1_000);

    let response = server
        .post("/withdraw")
        .json(&json!({ "destinationAddress": DEST, "amount": 25 }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["signature"].as_str().map(str::len), Some(64));
    assert!(body["message"].as_str().unwrap().contains(DEST));
    assert_eq!(backend.reserve_balance().unwrap(), Amount::from_num(975));
}

#[tokio::test]
async fn test_withdraw_rejects_bad_input() {
    let (server, backend) = server_with_reserve(1_000);

    let response = server
        .post("/withdraw")
        .json(&json!({ "destinationAddress": "not-an-address", "amount": 5 }))
        .await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert!(body["error"].is_string());

    for amount in [json!(0), json!(-3), json!(2.5), json!("abc")] {
        let response = server
            .post("/withdraw")
            .json(&json!({ "destinationAddress": DEST, "amount": amount }))
            .await;
        assert_eq!(response.status_code(), 400, "amount {}", amount);
    }

    let response = server.post("/withdraw").json(&json!({ "amount": 5 })).await;
    assert_eq!(response.status_code(), 400);

    assert_eq!(backend.reserve_balance().unwrap(), Amount::from_num(1_000));
}

#[tokio::test]
async fn test_withdraw_rejects_out_of_range_amount() {
    let (server, backend) = server_with_reserve(1_000);

    for amount in [json!(u64::MAX), json!("9000000000000000000")] {
        let response = server
            .post("/withdraw")
            .json(&json!({ "destinationAddress": DEST, "amount": amount }))
            .await;
        assert_eq!(response.status_code(), 400, "amount {}", amount);
    }
    assert_eq!(backend.reserve_balance().unwrap(), Amount::from_num(1_000));
}

#[tokio::test]
async fn test_withdraw_beyond_reserve_is_conflict() {
    let (server, _backend) = server_with_reserve(10);

    let response = server
        .post("/withdraw")
        .json(&json!({ "destinationAddress": DEST, "amount": 11 }))
        .await;
    assert_eq!(response.status_code(), 409);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("reserve"));
}

#[tokio::test]
async fn test_withdraw_without_backend_is_unavailable() {
    let connector = ReserveConnector::new(Amount::from_num(100)).with_unreachable(["reserve://primary"]);
    let state = RelayState::connect(
        &connector,
        &["reserve://primary".to_string()],
        2,
        Duration::from_millis(1),
    )
    .await;
    assert_eq!(connector.connect_calls(), 2);
    let server = TestServer::new(build_relay_router(state)).expect("Failed to create test server");

    let response = server
        .post("/withdraw")
        .json(&json!({ "destinationAddress": DEST, "amount": 1 }))
        .await;
    assert_eq!(response.status_code(), 503);

    let health: Value = server.get("/health").await.json();
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_health_reports_counters() {
    let (server, _backend) = server_with_reserve(100);
    server
        .post("/withdraw")
        .json(&json!({ "destinationAddress": DEST, "amount": 10 }))
        .await;
    server
        .post("/withdraw")
        .json(&json!({ "destinationAddress": DEST, "amount": 1000 }))
        .await;

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["backend"], "reserve://primary");
    assert_eq!(json["total_requests"], 2);
    assert_eq!(json["successful_transfers"], 1);
    assert_eq!(json["failed_transfers"], 1);
    assert!(json["timestamp"].is_string());
}
