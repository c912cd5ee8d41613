//! Billing run model.

use super::billing_date::IsoDate;
use super::subscription::{ExternalId, Subscription};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Where a subscription ended up within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    SkippedNotDue,
    SkippedInactive,
    /// A previous charge is still unsettled; never charged again here.
    AwaitingReconciliation,
    Charging,
    ChargeFailed,
    Ordering,
    /// Money captured, no order. Left for the reconciliation pass.
    OrderFailed,
    /// The intent or the reschedule could not be written to the store.
    PersistFailed,
    Rescheduled,
}

impl CycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleState::SkippedNotDue => "skipped_not_due",
            CycleState::SkippedInactive => "skipped_inactive",
            CycleState::AwaitingReconciliation => "awaiting_reconciliation",
            CycleState::Charging => "charging",
            CycleState::ChargeFailed => "charge_failed",
            CycleState::Ordering => "ordering",
            CycleState::OrderFailed => "order_failed",
            CycleState::PersistFailed => "persist_failed",
            CycleState::Rescheduled => "rescheduled",
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            CycleState::SkippedNotDue
            | CycleState::SkippedInactive
            | CycleState::AwaitingReconciliation => Outcome::Skipped,
            CycleState::Rescheduled => Outcome::Charged,
            CycleState::Charging
            | CycleState::ChargeFailed
            | CycleState::Ordering
            | CycleState::OrderFailed
            | CycleState::PersistFailed => Outcome::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Charged,
    Failed,
    Skipped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Charged => "charged",
            Outcome::Failed => "failed",
            Outcome::Skipped => "skipped",
        }
    }
}

/// Per-subscription entry of a run summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResult {
    pub customer_id: ExternalId,
    pub product_id: ExternalId,
    pub outcome: Outcome,
    pub state: CycleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<u64>,
    pub next_billing_date: IsoDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubscriptionResult {
    pub fn new(subscription: &Subscription, state: CycleState) -> Self {
        Self {
            customer_id: subscription.customer_id.clone(),
            product_id: subscription.product_id.clone(),
            outcome: state.outcome(),
            state,
            transaction_id: None,
            order_id: None,
            next_billing_date: subscription.next_billing_date,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_transaction(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }
}

/// Summary returned by one billing cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: Uuid,
    pub run_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub total: usize,
    /// Subscriptions that reached the charging step.
    pub processed: usize,
    pub charged: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<SubscriptionResult>,
}

impl RunSummary {
    pub fn new(
        run_id: Uuid,
        run_date: NaiveDate,
        started_at: DateTime<Utc>,
        results: Vec<SubscriptionResult>,
    ) -> Self {
        let count = |outcome: Outcome| results.iter().filter(|r| r.outcome == outcome).count();
        let processed = results
            .iter()
            .filter(|r| {
                !matches!(
                    r.state,
                    CycleState::SkippedNotDue
                        | CycleState::SkippedInactive
                        | CycleState::AwaitingReconciliation
                )
            })
            .count();

        Self {
            run_id,
            run_date,
            started_at,
            completed_at: Utc::now(),
            total: results.len(),
            processed,
            charged: count(Outcome::Charged),
            failed: count(Outcome::Failed),
            skipped: count(Outcome::Skipped),
            results,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    /// Order created for a captured charge; subscription rescheduled.
    Resolved,
    /// Order creation failed again; marker kept.
    Pending,
    /// Charge outcome unknown; needs a manual check on the gateway.
    Unresolved,
}

impl ReconciliationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationOutcome::Resolved => "resolved",
            ReconciliationOutcome::Pending => "pending",
            ReconciliationOutcome::Unresolved => "unresolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    pub customer_id: ExternalId,
    pub product_id: ExternalId,
    pub outcome: ReconciliationOutcome,
    pub idempotency_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<u64>,
    pub next_billing_date: IsoDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub resolved: usize,
    pub pending: usize,
    pub unresolved: usize,
    pub results: Vec<ReconciliationResult>,
}

impl ReconciliationSummary {
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        results: Vec<ReconciliationResult>,
    ) -> Self {
        let count = |outcome: ReconciliationOutcome| {
            results.iter().filter(|r| r.outcome == outcome).count()
        };
        Self {
            run_id,
            started_at,
            completed_at: Utc::now(),
            resolved: count(ReconciliationOutcome::Resolved),
            pending: count(ReconciliationOutcome::Pending),
            unresolved: count(ReconciliationOutcome::Unresolved),
            results,
        }
    }
}
