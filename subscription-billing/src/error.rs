//! Error types for the billing components.

use rust_decimal::Decimal;
use service_core::error::AppError;
use std::path::PathBuf;
use thiserror::Error;

/// Subscription store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("subscription file {} is not valid subscription data: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("subscription file {} could not be accessed: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode subscriptions: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("subscription {0} already exists")]
    Duplicate(String),
}

/// Payment gateway failures.
#[derive(Debug, Error)]
pub enum ChargeError {
    #[error("charge amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error("payment gateway credentials not configured")]
    NotConfigured,

    /// The gateway processed the transaction and refused it.
    #[error("payment declined: {reason}")]
    Declined {
        reason: String,
        response_code: String,
    },

    /// The gateway refused the request itself (authentication, validation).
    #[error("payment gateway error: {reason}")]
    Gateway { reason: String },

    #[error("payment gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ChargeError {
    /// Human-readable failure reason for result entries.
    pub fn reason(&self) -> String {
        match self {
            ChargeError::Declined { reason, .. } | ChargeError::Gateway { reason } => {
                reason.clone()
            }
            other => other.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChargeError::InvalidAmount(_) => "invalid_amount",
            ChargeError::NotConfigured => "not_configured",
            ChargeError::Declined { .. } => "declined",
            ChargeError::Gateway { .. } => "gateway_error",
            ChargeError::Transport(_) => "transport",
        }
    }
}

/// Storefront order creation failures.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("storefront credentials not configured")]
    NotConfigured,

    #[error("storefront rejected order with status {status}: {payload}")]
    Rejected {
        status: u16,
        payload: serde_json::Value,
    },

    #[error("storefront returned an unexpected response: {0}")]
    InvalidResponse(String),

    #[error("storefront unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failures that end a whole billing or reconciliation run.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("a billing run is already in progress")]
    RunInProgress,
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(_) => AppError::Conflict(anyhow::Error::new(err)),
            other => AppError::StorageError(anyhow::Error::new(other)),
        }
    }
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Store(store) => store.into(),
            BillingError::RunInProgress => AppError::Conflict(anyhow::Error::new(err)),
        }
    }
}

impl From<ChargeError> for AppError {
    fn from(err: ChargeError) -> Self {
        match err {
            ChargeError::InvalidAmount(_) => AppError::BadRequest(anyhow::Error::new(err)),
            ChargeError::Declined { .. } => AppError::PaymentRequired(err.to_string()),
            ChargeError::NotConfigured => AppError::ServiceUnavailable,
            ChargeError::Gateway { .. } | ChargeError::Transport(_) => {
                AppError::BadGateway(err.to_string())
            }
        }
    }
}
