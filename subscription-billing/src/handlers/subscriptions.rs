//! Subscription signup and listing.

use crate::models::{ExternalId, IsoDate, Subscription, SubscriptionStatus, SubscriptionType};
use crate::startup::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Map;
use service_core::error::AppError;
use validator::{Validate, ValidationError};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    #[serde(alias = "bigcommerceCustomerId")]
    #[validate(custom(function = "not_blank"))]
    pub customer_id: ExternalId,
    #[serde(alias = "authNetCustomerProfileId")]
    #[validate(custom(function = "not_blank"))]
    pub gateway_customer_profile_id: ExternalId,
    #[serde(alias = "authNetPaymentProfileId")]
    #[validate(custom(function = "not_blank"))]
    pub gateway_payment_profile_id: ExternalId,
    #[validate(custom(function = "not_blank"))]
    pub product_id: ExternalId,
    #[serde(with = "rust_decimal::serde::float")]
    #[validate(custom(function = "positive_amount"))]
    pub product_price: Decimal,
    pub subscription_type: SubscriptionType,
    pub start_date: Option<IsoDate>,
    pub next_billing_date: Option<IsoDate>,
}

pub(crate) fn not_blank(id: &ExternalId) -> Result<(), ValidationError> {
    if id.is_blank() {
        return Err(ValidationError::new("blank").with_message("must not be empty".into()));
    }
    Ok(())
}

pub(crate) fn positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount <= Decimal::ZERO {
        return Err(ValidationError::new("range").with_message("must be positive".into()));
    }
    Ok(())
}

impl CreateSubscriptionRequest {
    fn into_subscription(self) -> Result<Subscription, AppError> {
        let start_date = self
            .start_date
            .unwrap_or_else(|| IsoDate::Date(Utc::now().date_naive()));
        let next_billing_date = self.next_billing_date.unwrap_or(start_date);
        if next_billing_date.calendar_date() < start_date.calendar_date() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "nextBillingDate {} precedes startDate {}",
                next_billing_date,
                start_date
            )));
        }

        Ok(Subscription {
            customer_id: self.customer_id,
            gateway_customer_profile_id: self.gateway_customer_profile_id,
            gateway_payment_profile_id: self.gateway_payment_profile_id,
            product_id: self.product_id,
            product_price: self.product_price,
            subscription_type: self.subscription_type,
            start_date,
            next_billing_date,
            status: SubscriptionStatus::Active,
            pending_charge: None,
            extra: Map::new(),
        })
    }
}

/// Register a subscription against existing vault profiles.
#[tracing::instrument(skip(state, payload))]
pub async fn create_subscription(
    State(state): State<AppState>,
    payload: Result<Json<CreateSubscriptionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Subscription>), AppError> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(anyhow::anyhow!(e.body_text())))?;
    request.validate()?;
    let subscription = request.into_subscription()?;

    state.store.insert(subscription.clone()).await?;

    tracing::info!(
        customer_id = %subscription.customer_id,
        product_id = %subscription.product_id,
        subscription_type = subscription.subscription_type.as_str(),
        next_billing_date = %subscription.next_billing_date,
        "Subscription created"
    );

    Ok((StatusCode::CREATED, Json(subscription)))
}

/// List every stored subscription.
pub async fn list_subscriptions(
    State(state): State<AppState>,
) -> Result<Json<Vec<Subscription>>, AppError> {
    Ok(Json(state.store.load_all().await?))
}
