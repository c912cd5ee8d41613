//! Domain models for subscription-billing.

mod billing_date;
mod billing_run;
mod subscription;

pub use billing_date::{
    BillingInterval, IntervalPolicy, InvalidDate, IsoDate, DEFAULT_BI_MONTHLY_INTERVAL_DAYS,
};
pub use billing_run::{
    CycleState, Outcome, ReconciliationOutcome, ReconciliationResult, ReconciliationSummary,
    RunSummary, SubscriptionResult,
};
pub use subscription::{
    ChargeState, ExternalId, PendingCharge, Subscription, SubscriptionKey, SubscriptionStatus,
    SubscriptionType,
};
