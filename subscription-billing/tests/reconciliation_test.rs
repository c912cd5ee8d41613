//! Reconciliation pass integration tests.

mod common;

use chrono::NaiveDate;
use common::{subscription_json, FakeGateway, FakeOrders, TestStore};
use serde_json::json;
use subscription_billing::models::{CycleState, ReconciliationOutcome};

fn day(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
}

/// Leave one subscription charged but unordered.
async fn charged_without_order(store: &TestStore) {
    let driver = store.driver(FakeGateway::new(), FakeOrders::rejecting(1));
    let summary = driver.run(day("2024-03-01")).await.unwrap();
    assert_eq!(summary.results[0].state, CycleState::OrderFailed);
}

#[tokio::test]
async fn captured_charge_gets_its_order_and_is_rescheduled() {
    let store = TestStore::seeded(json!([subscription_json(42, "2024-03-01")]));
    charged_without_order(&store).await;

    let gateway = FakeGateway::new();
    let orders = FakeOrders::new();
    let summary = store
        .driver(gateway.clone(), orders.clone())
        .reconcile()
        .await
        .unwrap();

    assert_eq!(summary.resolved, 1);
    let result = &summary.results[0];
    assert_eq!(result.outcome, ReconciliationOutcome::Resolved);
    assert_eq!(result.transaction_id.as_deref(), Some("txn-1"));
    assert_eq!(result.order_id, Some(101));
    assert_eq!(result.next_billing_date.to_string(), "2024-04-01");

    // Reconciliation never charges.
    assert!(gateway.calls().is_empty());
    assert_eq!(
        orders.calls()[0].metadata.transaction_id.as_deref(),
        Some("txn-1")
    );

    let written = store.read_json();
    assert_eq!(written[0]["nextBillingDate"], "2024-04-01");
    assert!(written[0].get("pendingCharge").is_none());
}

#[tokio::test]
async fn failed_retry_keeps_the_marker() {
    let store = TestStore::seeded(json!([subscription_json(42, "2024-03-01")]));
    charged_without_order(&store).await;

    let summary = store
        .driver(FakeGateway::new(), FakeOrders::rejecting(1))
        .reconcile()
        .await
        .unwrap();

    assert_eq!(summary.pending, 1);
    assert!(summary.results[0].error.is_some());
    let record = &store.records()[0];
    assert!(record.pending_charge.is_some());
    assert_eq!(record.next_billing_date.to_string(), "2024-03-01");
}

#[tokio::test]
async fn intent_marker_is_reported_for_manual_review() {
    let mut record = subscription_json(42, "2024-03-01");
    record["pendingCharge"] = json!({
        "billingPeriod": "2024-03-01",
        "idempotencyKey": "0123456789abcdef0123",
        "state": "intent",
        "recordedAt": "2024-03-01T06:00:00Z"
    });
    let store = TestStore::seeded(json!([record]));
    let before = store.read_json();
    let gateway = FakeGateway::new();
    let orders = FakeOrders::new();

    let summary = store
        .driver(gateway.clone(), orders.clone())
        .reconcile()
        .await
        .unwrap();

    assert_eq!(summary.unresolved, 1);
    assert_eq!(summary.results[0].idempotency_key, "0123456789abcdef0123");
    assert!(gateway.calls().is_empty());
    assert!(orders.calls().is_empty());
    assert_eq!(store.read_json(), before);
}

#[tokio::test]
async fn subscriptions_without_markers_are_ignored() {
    let store = TestStore::seeded(json!([
        subscription_json(1, "2024-03-01"),
        subscription_json(2, "2024-03-01"),
    ]));
    let orders = FakeOrders::new();

    let summary = store
        .driver(FakeGateway::new(), orders.clone())
        .reconcile()
        .await
        .unwrap();

    assert!(summary.results.is_empty());
    assert!(orders.calls().is_empty());
}

#[tokio::test]
async fn resolved_subscription_bills_normally_next_period() {
    let store = TestStore::seeded(json!([subscription_json(42, "2024-03-01")]));
    charged_without_order(&store).await;
    store
        .driver(FakeGateway::new(), FakeOrders::new())
        .reconcile()
        .await
        .unwrap();

    let gateway = FakeGateway::new();
    let summary = store
        .driver(gateway.clone(), FakeOrders::new())
        .run(day("2024-04-01"))
        .await
        .unwrap();

    assert_eq!(summary.charged, 1);
    assert_eq!(gateway.calls().len(), 1);
    assert_eq!(store.read_json()[0]["nextBillingDate"], "2024-05-01");
}
