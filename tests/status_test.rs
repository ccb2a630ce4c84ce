//! Status and health endpoint tests

mod common;

use axum::http::StatusCode;
use common::{body_bytes, body_json, payload, TestHarness};

#[tokio::test]
async fn test_health_endpoint() {
    let harness = TestHarness::new();
    let response = harness.get("/health", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response.into_body()).await.as_ref(), b"ok");
}

#[tokio::test]
async fn test_status_when_idle() {
    let harness = TestHarness::new();
    let response = harness.get("/", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["server_status"], "running");
    assert_eq!(json["connected_identities"], 2);
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["uptime"].as_str().unwrap().ends_with('s'));
    assert_eq!(json["loads"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_status_loads_sorted_busiest_first() {
    let harness = TestHarness::with_identities(&[("bot1", 2), ("bot2", 2), ("bot3", 2)]);
    let link = harness.insert(7, 2, None, None, payload(100));

    // Four open bodies over three identities, then release the first.
    let first = harness.download(&link, None).await;
    let _second = harness.download(&link, None).await;
    let _third = harness.download(&link, None).await;
    let _fourth = harness.download(&link, None).await;
    drop(first);
    assert_eq!(harness.dispatcher.workloads(), vec![1, 1, 1]);

    let _fifth = harness.download(&link, None).await;
    assert_eq!(harness.dispatcher.workloads(), vec![2, 1, 1]);

    let json = body_json(harness.get("/", None).await.into_body()).await;
    let loads = json["loads"].as_array().unwrap();
    assert_eq!(loads[0]["identity"], "bot1");
    assert_eq!(loads[0]["load"], 2);
    assert_eq!(loads[1]["load"], 1);
    assert_eq!(loads[2]["load"], 1);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let harness = TestHarness::new();
    let response = harness.get("/nope", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
