//! Test helper module for subscription-billing integration tests.
//!
//! Provides in-memory vendor fakes, a temp-dir subscription file and a
//! running HTTP service.

#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subscription_billing::config::{
    AuthorizeNetConfig, BigCommerceConfig, BillingConfig, BillingPolicyConfig, StorageConfig,
};
use subscription_billing::error::{ChargeError, OrderError};
use subscription_billing::models::{ExternalId, IntervalPolicy, Subscription};
use subscription_billing::services::{
    BillingCycleDriver, ChargeReceipt, ChargeReference, LineItem, OrderMetadata, OrderPlatform,
    OrderReceipt, PaymentGateway, ProfileRef, SubscriptionStore,
};
use subscription_billing::startup::Application;
use tempfile::TempDir;
use tokio::sync::Notify;

/// Scripted gateway answer.
#[derive(Debug, Clone)]
pub enum ChargeScript {
    Approve,
    Decline(&'static str),
    GatewayError(&'static str),
}

#[derive(Debug, Clone)]
pub struct ChargeCall {
    pub profile: ProfileRef,
    pub amount: Decimal,
    pub ref_id: Option<String>,
}

/// Gateway double: approves unless scripted otherwise.
#[derive(Default)]
pub struct FakeGateway {
    script: Mutex<VecDeque<ChargeScript>>,
    calls: Mutex<Vec<ChargeCall>>,
    hold: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(answers: impl IntoIterator<Item = ChargeScript>) -> Arc<Self> {
        let gateway = Self::default();
        *gateway.script.lock().unwrap() = answers.into_iter().collect();
        Arc::new(gateway)
    }

    /// Park every charge until `release` is notified; `entered` fires when a
    /// charge starts waiting.
    pub fn hold(&self, entered: Arc<Notify>, release: Arc<Notify>) {
        *self.hold.lock().unwrap() = Some((entered, release));
    }

    pub fn calls(&self) -> Vec<ChargeCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn charge(
        &self,
        profile: &ProfileRef,
        amount: Decimal,
        reference: Option<&ChargeReference>,
    ) -> Result<ChargeReceipt, ChargeError> {
        let hold = self.hold.lock().unwrap().clone();
        if let Some((entered, release)) = hold {
            entered.notify_one();
            release.notified().await;
        }

        let number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(ChargeCall {
                profile: profile.clone(),
                amount,
                ref_id: reference.map(|r| r.ref_id.clone()),
            });
            calls.len()
        };

        let answer = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ChargeScript::Approve);

        match answer {
            ChargeScript::Approve => Ok(ChargeReceipt {
                transaction_id: format!("txn-{}", number),
                auth_code: Some("AUTH01".to_string()),
                response_code: "1".to_string(),
            }),
            ChargeScript::Decline(reason) => Err(ChargeError::Declined {
                reason: reason.to_string(),
                response_code: "2".to_string(),
            }),
            ChargeScript::GatewayError(reason) => Err(ChargeError::Gateway {
                reason: reason.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderCall {
    pub customer_id: ExternalId,
    pub line_items: Vec<LineItem>,
    pub metadata: OrderMetadata,
}

/// Storefront double: creates orders unless told to reject them.
#[derive(Default)]
pub struct FakeOrders {
    rejections: Mutex<VecDeque<u16>>,
    calls: Mutex<Vec<OrderCall>>,
}

impl FakeOrders {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reject the next `count` orders with a 422.
    pub fn rejecting(count: usize) -> Arc<Self> {
        let orders = Self::default();
        *orders.rejections.lock().unwrap() = std::iter::repeat(422).take(count).collect();
        Arc::new(orders)
    }

    pub fn calls(&self) -> Vec<OrderCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderPlatform for FakeOrders {
    async fn create_order(
        &self,
        customer_id: &ExternalId,
        line_items: &[LineItem],
        metadata: &OrderMetadata,
    ) -> Result<OrderReceipt, OrderError> {
        let number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(OrderCall {
                customer_id: customer_id.clone(),
                line_items: line_items.to_vec(),
                metadata: metadata.clone(),
            });
            calls.len()
        };

        if let Some(status) = self.rejections.lock().unwrap().pop_front() {
            return Err(OrderError::Rejected {
                status,
                payload: json!([{"status": status, "message": "The product is not purchasable."}]),
            });
        }

        Ok(OrderReceipt {
            order_id: 100 + number as u64,
            status_id: Some(11),
        })
    }
}

/// Subscription record in the on-disk format.
pub fn subscription_json(customer: u64, next_billing_date: &str) -> Value {
    json!({
        "customerId": customer,
        "gatewayCustomerProfileId": format!("cp-{}", customer),
        "gatewayPaymentProfileId": format!("pp-{}", customer),
        "productId": 77,
        "productPrice": 49.99,
        "subscriptionType": "monthly",
        "startDate": "2024-01-01T00:00:00.000Z",
        "nextBillingDate": next_billing_date,
        "status": "active"
    })
}

/// Subscription file in a temp dir.
pub struct TestStore {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl TestStore {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("subscriptions.json");
        Self { dir, path }
    }

    pub fn seeded(records: Value) -> Self {
        let store = Self::new();
        store.write(&records);
        store
    }

    pub fn write(&self, records: &Value) {
        std::fs::write(&self.path, serde_json::to_vec_pretty(records).unwrap())
            .expect("Failed to seed subscription file");
    }

    pub fn read_json(&self) -> Value {
        serde_json::from_slice(&std::fs::read(&self.path).expect("Failed to read store"))
            .expect("Subscription file is not JSON")
    }

    pub fn records(&self) -> Vec<Subscription> {
        serde_json::from_value(self.read_json()).expect("Invalid subscription records")
    }

    pub fn store(&self) -> Arc<SubscriptionStore> {
        Arc::new(SubscriptionStore::new(self.path.clone()))
    }

    pub fn driver(
        &self,
        gateway: Arc<dyn PaymentGateway>,
        orders: Arc<dyn OrderPlatform>,
    ) -> BillingCycleDriver {
        BillingCycleDriver::new(self.store(), gateway, orders, IntervalPolicy::default())
    }
}

pub fn test_config(subscriptions_path: PathBuf) -> BillingConfig {
    BillingConfig {
        common: CoreConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Random port
        },
        service_name: "subscription-billing-test".to_string(),
        service_version: "0.1.0".to_string(),
        log_level: "warn".to_string(),
        otlp_endpoint: None,
        storage: StorageConfig { subscriptions_path },
        authorize_net: AuthorizeNetConfig {
            api_login_id: String::new(),
            transaction_key: Secret::new(String::new()),
            endpoint: "http://127.0.0.1:1/xml/v1/request.api".to_string(),
            request_timeout: Duration::from_secs(1),
        },
        bigcommerce: BigCommerceConfig {
            store_hash: String::new(),
            access_token: Secret::new(String::new()),
            api_base_url: String::new(),
            request_timeout: Duration::from_secs(1),
        },
        billing: BillingPolicyConfig {
            intervals: IntervalPolicy::default(),
            order_status_id: 11,
        },
    }
}

/// Test application wrapper for integration tests.
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub store: TestStore,
    pub gateway: Arc<FakeGateway>,
    pub orders: Arc<FakeOrders>,
    pub client: reqwest::Client,
}

impl TestApp {
    /// Spawn the service on a random port with approving fakes.
    pub async fn spawn() -> Self {
        Self::spawn_with(TestStore::new(), FakeGateway::new(), FakeOrders::new()).await
    }

    pub async fn spawn_with(
        store: TestStore,
        gateway: Arc<FakeGateway>,
        orders: Arc<FakeOrders>,
    ) -> Self {
        let config = test_config(store.path.clone());
        let app = Application::build_with(config, gateway.clone(), orders.clone())
            .await
            .expect("Failed to build test application");

        let port = app.http_port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            store,
            gateway,
            orders,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }
}
