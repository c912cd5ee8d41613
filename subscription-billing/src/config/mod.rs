//! Configuration module for subscription-billing.

use crate::models::{IntervalPolicy, DEFAULT_BI_MONTHLY_INTERVAL_DAYS};
use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const AUTHORIZE_NET_SANDBOX_URL: &str = "https://apitest.authorize.net/xml/v1/request.api";
pub const AUTHORIZE_NET_PRODUCTION_URL: &str = "https://api.authorize.net/xml/v1/request.api";

/// BigCommerce "Awaiting Fulfillment".
pub const DEFAULT_ORDER_STATUS_ID: u32 = 11;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub storage: StorageConfig,
    pub authorize_net: AuthorizeNetConfig,
    pub bigcommerce: BigCommerceConfig,
    pub billing: BillingPolicyConfig,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub subscriptions_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AuthorizeNetConfig {
    pub api_login_id: String,
    pub transaction_key: Secret<String>,
    pub endpoint: String,
    pub request_timeout: Duration,
}

impl AuthorizeNetConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_login_id.is_empty() && !self.transaction_key.expose_secret().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BigCommerceConfig {
    pub store_hash: String,
    pub access_token: Secret<String>,
    /// Base of the v2 API, without a trailing slash.
    pub api_base_url: String,
    pub request_timeout: Duration,
}

impl BigCommerceConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_base_url.is_empty() && !self.access_token.expose_secret().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BillingPolicyConfig {
    pub intervals: IntervalPolicy,
    pub order_status_id: u32,
}

impl BillingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let mut common = core_config::Config::load()?;
        // PaaS platforms hand the port over as plain PORT.
        if let Some(port) = parse_var::<u16>("PORT")? {
            common.port = port;
        }

        let request_timeout = Duration::from_secs(
            parse_var("HTTP_CLIENT_TIMEOUT_SECS")?.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
        );

        let bi_monthly_days =
            parse_var("BI_MONTHLY_INTERVAL_DAYS")?.unwrap_or(DEFAULT_BI_MONTHLY_INTERVAL_DAYS);
        if bi_monthly_days == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BI_MONTHLY_INTERVAL_DAYS must be greater than zero"
            )));
        }

        let store_hash = env::var("BC_STORE_HASH")
            .or_else(|_| env::var("BIGCOMMERCE_STORE_HASH"))
            .unwrap_or_default();

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "subscription-billing".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            storage: StorageConfig {
                subscriptions_path: env::var("SUBSCRIPTIONS_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("data/subscriptions.json")),
            },
            authorize_net: AuthorizeNetConfig {
                api_login_id: env::var("AUTHORIZE_API_LOGIN_ID").unwrap_or_default(),
                transaction_key: Secret::new(
                    env::var("AUTHORIZE_TRANSACTION_KEY").unwrap_or_default(),
                ),
                endpoint: authorize_net_endpoint(
                    env::var("AUTHORIZE_API_URL").ok().as_deref(),
                    env::var("AUTHORIZE_ENVIRONMENT").ok().as_deref(),
                )?,
                request_timeout,
            },
            bigcommerce: BigCommerceConfig {
                api_base_url: bigcommerce_base_url(
                    env::var("BIGCOMMERCE_API_URL").ok().as_deref(),
                    &store_hash,
                ),
                store_hash,
                access_token: Secret::new(env::var("BC_ACCESS_TOKEN").unwrap_or_default()),
                request_timeout,
            },
            billing: BillingPolicyConfig {
                intervals: IntervalPolicy {
                    bi_monthly_days,
                },
                order_status_id: parse_var("ORDER_STATUS_ID")?
                    .unwrap_or(DEFAULT_ORDER_STATUS_ID),
            },
        })
    }
}

/// Read an optional variable, failing on a value that does not parse.
fn parse_var<T>(key: &str) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map(Some).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
        }),
        _ => Ok(None),
    }
}

fn authorize_net_endpoint(
    override_url: Option<&str>,
    environment: Option<&str>,
) -> Result<String, AppError> {
    if let Some(url) = override_url.filter(|u| !u.is_empty()) {
        return Ok(url.to_string());
    }
    match environment.map(str::to_ascii_lowercase).as_deref() {
        None | Some("") | Some("sandbox") => Ok(AUTHORIZE_NET_SANDBOX_URL.to_string()),
        Some("production") => Ok(AUTHORIZE_NET_PRODUCTION_URL.to_string()),
        Some(other) => Err(AppError::ConfigError(anyhow::anyhow!(
            "AUTHORIZE_ENVIRONMENT must be 'sandbox' or 'production', got '{}'",
            other
        ))),
    }
}

fn bigcommerce_base_url(override_url: Option<&str>, store_hash: &str) -> String {
    match override_url.filter(|u| !u.is_empty()) {
        Some(url) => url.trim_end_matches('/').to_string(),
        None if store_hash.is_empty() => String::new(),
        None => format!("https://api.bigcommerce.com/stores/{}/v2", store_hash),
    }
}
