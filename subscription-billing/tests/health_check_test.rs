//! Health check integration tests for subscription-billing.

mod common;

use common::{subscription_json, TestApp, TestStore};
use serde_json::json;

#[tokio::test]
async fn health_check_works() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "subscription-billing");
}

#[tokio::test]
async fn request_id_is_propagated() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.url("/health"))
        .header("x-request-id", "req-123")
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.headers()["x-request-id"], "req-123");
}

#[tokio::test]
async fn readiness_check_works() {
    let app = TestApp::spawn_with(
        TestStore::seeded(json!([subscription_json(1, "2024-03-01")])),
        common::FakeGateway::new(),
        common::FakeOrders::new(),
    )
    .await;

    let response = app
        .client
        .get(app.url("/ready"))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
}

#[tokio::test]
async fn readiness_fails_on_a_corrupt_store() {
    let store = TestStore::new();
    std::fs::write(&store.path, "not json").unwrap();
    let app =
        TestApp::spawn_with(store, common::FakeGateway::new(), common::FakeOrders::new()).await;

    let response = app
        .client
        .get(app.url("/ready"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 503);
}

#[tokio::test]
async fn metrics_endpoint_works() {
    let app = TestApp::spawn().await;

    app.client
        .post(app.url("/process-subscriptions?date=2024-03-01"))
        .send()
        .await
        .expect("Failed to execute request");

    let response = app
        .client
        .get(app.url("/metrics"))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    let body = response.text().await.expect("Failed to read body");
    assert!(body.contains("subscription_billing_runs_total"));
}
