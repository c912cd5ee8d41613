//! Subscription model.

use super::billing_date::{BillingInterval, IntervalPolicy, IsoDate};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

/// Identifier owned by another system, stored as whatever JSON type it
/// arrived as. Numbers keep their written form (`42`, `-7`, `42.0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalId {
    Number(Number),
    Text(String),
}

impl ExternalId {
    pub fn is_blank(&self) -> bool {
        matches!(self, ExternalId::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalId::Number(n) => write!(f, "{}", n),
            ExternalId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for ExternalId {
    fn from(value: u64) -> Self {
        ExternalId::Number(value.into())
    }
}

impl From<&str> for ExternalId {
    fn from(value: &str) -> Self {
        ExternalId::Text(value.to_string())
    }
}

/// Subscription plan cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubscriptionType {
    Monthly,
    BiMonthly,
}

impl SubscriptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionType::Monthly => "monthly",
            SubscriptionType::BiMonthly => "bi-monthly",
        }
    }

    pub fn interval(&self, policy: &IntervalPolicy) -> BillingInterval {
        match self {
            SubscriptionType::Monthly => BillingInterval::Months(1),
            SubscriptionType::BiMonthly => BillingInterval::Days(policy.bi_monthly_days),
        }
    }
}

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Inactive,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Inactive => "inactive",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

/// Progress of a charge that has been started but not fully settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeState {
    /// Recorded before the gateway call; outcome unknown if still present.
    Intent,
    /// Money captured, order not yet created.
    Captured,
}

/// Durable marker written around the charge and order steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCharge {
    pub billing_period: NaiveDate,
    pub idempotency_key: String,
    pub state: ChargeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_code: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl PendingCharge {
    pub fn intent(billing_period: NaiveDate, idempotency_key: String) -> Self {
        Self {
            billing_period,
            idempotency_key,
            state: ChargeState::Intent,
            transaction_id: None,
            auth_code: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn captured(mut self, transaction_id: &str, auth_code: Option<&str>) -> Self {
        self.state = ChargeState::Captured;
        self.transaction_id = Some(transaction_id.to_string());
        self.auth_code = auth_code.map(str::to_string);
        self.recorded_at = Utc::now();
        self
    }
}

/// Store key of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub customer_id: ExternalId,
    pub product_id: ExternalId,
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.customer_id, self.product_id)
    }
}

/// Subscription record as persisted in the subscription file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(alias = "bigcommerceCustomerId")]
    pub customer_id: ExternalId,
    #[serde(alias = "authNetCustomerProfileId")]
    pub gateway_customer_profile_id: ExternalId,
    #[serde(alias = "authNetPaymentProfileId")]
    pub gateway_payment_profile_id: ExternalId,
    pub product_id: ExternalId,
    #[serde(with = "json_price")]
    pub product_price: Decimal,
    pub subscription_type: SubscriptionType,
    pub start_date: IsoDate,
    pub next_billing_date: IsoDate,
    #[serde(default)]
    pub status: SubscriptionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_charge: Option<PendingCharge>,
    /// Fields this service does not interpret, written back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Prices are read as JSON numbers and written back in the same shape:
/// whole amounts as integers, everything else as a float.
mod json_price {
    use rust_decimal::prelude::ToPrimitive;
    use rust_decimal::Decimal;
    use serde::ser::Error;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        if value.fract().is_zero() {
            if let Some(whole) = value.to_i64() {
                return serializer.serialize_i64(whole);
            }
        }
        let float = value
            .to_f64()
            .ok_or_else(|| S::Error::custom(format!("price {} is not representable", value)))?;
        serializer.serialize_f64(float)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        rust_decimal::serde::float::deserialize(deserializer)
    }
}

impl Subscription {
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey {
            customer_id: self.customer_id.clone(),
            product_id: self.product_id.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    /// The calendar day this charge belongs to.
    pub fn billing_period(&self) -> NaiveDate {
        self.next_billing_date.calendar_date()
    }

    /// Active and scheduled for `today` or earlier.
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.is_active() && self.billing_period() <= today
    }

    pub fn next_billing_date_after_charge(&self, policy: &IntervalPolicy) -> Option<IsoDate> {
        self.next_billing_date
            .advance(self.subscription_type.interval(policy))
    }
}
