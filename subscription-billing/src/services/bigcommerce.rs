//! BigCommerce v2 order client.

use crate::config::BigCommerceConfig;
use crate::error::OrderError;
use crate::models::ExternalId;
use crate::services::metrics::observe_external_call;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const PAYMENT_METHOD: &str = "Authorize.Net";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItem {
    pub product_id: ExternalId,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

impl LineItem {
    pub fn single(product_id: ExternalId, price: Decimal) -> Self {
        Self {
            product_id,
            quantity: 1,
            price,
        }
    }
}

/// Payment details recorded on the order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderMetadata {
    pub transaction_id: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    pub order_id: u64,
    pub status_id: Option<u32>,
}

/// Creates storefront orders for captured charges.
#[async_trait]
pub trait OrderPlatform: Send + Sync {
    async fn create_order(
        &self,
        customer_id: &ExternalId,
        line_items: &[LineItem],
        metadata: &OrderMetadata,
    ) -> Result<OrderReceipt, OrderError>;
}

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    customer_id: &'a ExternalId,
    status_id: u32,
    products: Vec<OrderProduct<'a>>,
    payment_method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_provider_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    staff_notes: Option<String>,
}

#[derive(Debug, Serialize)]
struct OrderProduct<'a> {
    product_id: &'a ExternalId,
    quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    price_ex_tax: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    price_inc_tax: Decimal,
}

#[derive(Debug, Deserialize)]
struct CreatedOrder {
    id: Option<u64>,
    status_id: Option<u32>,
}

/// BigCommerce client.
#[derive(Clone)]
pub struct BigCommerceClient {
    client: Client,
    config: BigCommerceConfig,
    status_id: u32,
}

impl BigCommerceClient {
    pub fn new(config: BigCommerceConfig, status_id: u32) -> Result<Self, OrderError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            config,
            status_id,
        })
    }

    /// Check if the store is set.
    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn build_body<'a>(
        &self,
        customer_id: &'a ExternalId,
        line_items: &'a [LineItem],
        metadata: &'a OrderMetadata,
    ) -> CreateOrderBody<'a> {
        CreateOrderBody {
            customer_id,
            status_id: self.status_id,
            products: line_items
                .iter()
                .map(|item| OrderProduct {
                    product_id: &item.product_id,
                    quantity: item.quantity,
                    price_ex_tax: item.price,
                    price_inc_tax: item.price,
                })
                .collect(),
            payment_method: PAYMENT_METHOD,
            payment_provider_id: metadata.transaction_id.as_deref(),
            staff_notes: metadata
                .reference
                .as_ref()
                .map(|r| format!("Subscription charge {}", r)),
        }
    }
}

#[async_trait]
impl OrderPlatform for BigCommerceClient {
    async fn create_order(
        &self,
        customer_id: &ExternalId,
        line_items: &[LineItem],
        metadata: &OrderMetadata,
    ) -> Result<OrderReceipt, OrderError> {
        if !self.is_configured() {
            return Err(OrderError::NotConfigured);
        }

        let url = format!("{}/orders", self.config.api_base_url);
        let body = self.build_body(customer_id, line_items, metadata);
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .header("X-Auth-Token", self.config.access_token.expose_secret())
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await;
        observe_external_call("bigcommerce", "create_order", start.elapsed());

        let response = response?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let payload = serde_json::from_str(&text)
                .unwrap_or_else(|_| serde_json::Value::String(text.clone()));
            tracing::error!(
                status = %status,
                customer_id = %customer_id,
                payload = %payload,
                "BigCommerce rejected order"
            );
            return Err(OrderError::Rejected {
                status: status.as_u16(),
                payload,
            });
        }

        let created: CreatedOrder = serde_json::from_str(&text)
            .map_err(|e| OrderError::InvalidResponse(format!("{}: {}", e, text)))?;
        let order_id = created
            .id
            .ok_or_else(|| OrderError::InvalidResponse(format!("order id missing: {}", text)))?;

        tracing::info!(
            order_id = order_id,
            customer_id = %customer_id,
            "BigCommerce order created"
        );

        Ok(OrderReceipt {
            order_id,
            status_id: created.status_id,
        })
    }
}
