//! One-off charges of vaulted profiles.

use super::subscriptions::{not_blank, positive_amount};
use crate::error::ChargeError;
use crate::models::ExternalId;
use crate::services::{ChargeReference, ChargeResult, ProfileRef};
use crate::startup::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChargeProfileRequest {
    #[serde(alias = "authNetCustomerProfileId")]
    #[validate(custom(function = "not_blank"))]
    pub customer_profile_id: ExternalId,
    #[serde(alias = "authNetPaymentProfileId")]
    #[validate(custom(function = "not_blank"))]
    pub payment_profile_id: ExternalId,
    #[serde(with = "rust_decimal::serde::float")]
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    #[validate(length(min = 1, max = 20, message = "invoiceNumber must be 1-20 characters"))]
    pub invoice_number: Option<String>,
    #[validate(length(max = 255))]
    pub description: Option<String>,
}

fn charge_status(error: &ChargeError) -> StatusCode {
    match error {
        ChargeError::Declined { .. } => StatusCode::PAYMENT_REQUIRED,
        ChargeError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        ChargeError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        ChargeError::Gateway { .. } | ChargeError::Transport(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Authorize and capture a one-off amount.
#[tracing::instrument(skip(state, payload))]
pub async fn charge_profile(
    State(state): State<AppState>,
    payload: Result<Json<ChargeProfileRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ChargeResult>), AppError> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(anyhow::anyhow!(e.body_text())))?;
    request.validate()?;

    let profile = ProfileRef::new(&request.customer_profile_id, &request.payment_profile_id);
    let reference = request.invoice_number.map(|ref_id| ChargeReference {
        ref_id,
        description: request.description,
    });

    let outcome = state
        .gateway
        .charge(&profile, request.amount, reference.as_ref())
        .await;

    let status = match &outcome {
        Ok(receipt) => {
            tracing::info!(
                transaction_id = %receipt.transaction_id,
                amount = %request.amount,
                "One-off charge approved"
            );
            StatusCode::OK
        }
        Err(e) => charge_status(e),
    };

    Ok((status, Json(ChargeResult::from_outcome(&outcome))))
}
