//! Billing run triggers.

use crate::models::{ReconciliationSummary, RunSummary};
use crate::startup::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use service_core::error::AppError;

#[derive(Debug, Deserialize)]
pub struct ProcessSubscriptionsQuery {
    /// Run as of this UTC day instead of today.
    pub date: Option<NaiveDate>,
}

/// Run one billing cycle.
#[tracing::instrument(skip(state))]
pub async fn process_subscriptions(
    State(state): State<AppState>,
    Query(query): Query<ProcessSubscriptionsQuery>,
) -> Result<Json<RunSummary>, AppError> {
    let today = query.date.unwrap_or_else(|| Utc::now().date_naive());
    let summary = state.driver.run(today).await?;
    Ok(Json(summary))
}

/// Settle charges left pending by earlier runs.
#[tracing::instrument(skip(state))]
pub async fn reconcile_subscriptions(
    State(state): State<AppState>,
) -> Result<Json<ReconciliationSummary>, AppError> {
    let summary = state.driver.reconcile().await?;
    Ok(Json(summary))
}
