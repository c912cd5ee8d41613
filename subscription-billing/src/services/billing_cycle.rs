//! Billing cycle driver.
//!
//! One pass over the subscription file: every active subscription whose
//! `nextBillingDate` has arrived is charged, an order is created for the
//! captured payment, and the subscription is rescheduled.
//!
//! Each charge is bracketed by a durable `pendingCharge` marker:
//!
//! ```text
//! due -> intent recorded -> charged (captured) -> order created -> rescheduled
//!              |                  |                    |
//!              |                  |                    +-- order failed: marker kept
//!              |                  +-- charge failed: marker cleared
//!              +-- write failed: nothing charged
//! ```
//!
//! A subscription that still carries a marker is never charged again by a
//! cycle; [`BillingCycleDriver::reconcile`] settles it instead.

use crate::error::{BillingError, ChargeError};
use crate::models::{
    ChargeState, CycleState, IntervalPolicy, PendingCharge, ReconciliationOutcome,
    ReconciliationResult, ReconciliationSummary, RunSummary, Subscription, SubscriptionKey,
    SubscriptionResult,
};
use crate::services::authorize_net::{ChargeReceipt, ChargeReference, PaymentGateway, ProfileRef};
use crate::services::bigcommerce::{LineItem, OrderMetadata, OrderPlatform};
use crate::services::metrics::{
    record_billing_run, record_charge_amount, record_subscription_outcome,
};
use crate::services::store::SubscriptionStore;
use chrono::{NaiveDate, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Length of the gateway `refId` / `invoiceNumber` fields.
const IDEMPOTENCY_KEY_LEN: usize = 20;

/// Stable key for one charge of one subscription period.
pub fn idempotency_key(key: &SubscriptionKey, billing_period: NaiveDate) -> String {
    let digest = Sha256::digest(
        format!(
            "{}|{}|{}",
            key.customer_id,
            key.product_id,
            billing_period.format("%Y-%m-%d")
        )
        .as_bytes(),
    );
    let mut encoded = hex::encode(digest);
    encoded.truncate(IDEMPOTENCY_KEY_LEN);
    encoded
}

pub struct BillingCycleDriver {
    store: Arc<SubscriptionStore>,
    gateway: Arc<dyn PaymentGateway>,
    orders: Arc<dyn OrderPlatform>,
    intervals: IntervalPolicy,
    run_guard: Mutex<()>,
}

impl BillingCycleDriver {
    pub fn new(
        store: Arc<SubscriptionStore>,
        gateway: Arc<dyn PaymentGateway>,
        orders: Arc<dyn OrderPlatform>,
        intervals: IntervalPolicy,
    ) -> Self {
        Self {
            store,
            gateway,
            orders,
            intervals,
            run_guard: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<SubscriptionStore> {
        &self.store
    }

    /// Run one billing cycle as of `today`.
    ///
    /// Fails only when the store cannot be loaded or another run holds the
    /// guard. Per-subscription failures are reported in the summary.
    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    pub async fn run(&self, today: NaiveDate) -> Result<RunSummary, BillingError> {
        let _guard = self
            .run_guard
            .try_lock()
            .map_err(|_| BillingError::RunInProgress)?;

        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let started_at = Utc::now();
        info!(run_date = %today, "Billing cycle started");

        let subscriptions = match self.store.load_all().await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                error!(error = %e, "Billing cycle aborted: subscriptions not loaded");
                record_billing_run("cycle", "failed");
                return Err(e.into());
            }
        };

        let mut results = Vec::with_capacity(subscriptions.len());
        for (index, subscription) in subscriptions.into_iter().enumerate() {
            let result = self.process(index, subscription, today).await;
            record_subscription_outcome(result.outcome.as_str(), result.state.as_str());
            results.push(result);
        }

        let summary = RunSummary::new(run_id, today, started_at, results);
        record_billing_run("cycle", "completed");
        info!(
            total = summary.total,
            processed = summary.processed,
            charged = summary.charged,
            failed = summary.failed,
            skipped = summary.skipped,
            "Billing cycle completed"
        );
        Ok(summary)
    }

    /// Takes the record's position in the loaded document: every write goes
    /// back to that record even when another one shares its key.
    async fn process(
        &self,
        index: usize,
        subscription: Subscription,
        today: NaiveDate,
    ) -> SubscriptionResult {
        let key = subscription.key();

        if !subscription.is_active() {
            return SubscriptionResult::new(&subscription, CycleState::SkippedInactive);
        }
        if !subscription.is_due(today) {
            return SubscriptionResult::new(&subscription, CycleState::SkippedNotDue);
        }
        if let Some(marker) = &subscription.pending_charge {
            warn!(
                subscription = %key,
                idempotency_key = %marker.idempotency_key,
                "Unsettled charge on record; not charging again"
            );
            return SubscriptionResult::new(&subscription, CycleState::AwaitingReconciliation)
                .with_error(format!(
                    "charge {} awaiting reconciliation",
                    marker.idempotency_key
                ));
        }

        let Some(next_billing_date) = subscription.next_billing_date_after_charge(&self.intervals)
        else {
            return SubscriptionResult::new(&subscription, CycleState::PersistFailed)
                .with_error("next billing date out of range");
        };

        let billing_period = subscription.billing_period();
        let reference_key = idempotency_key(&key, billing_period);
        let intent = PendingCharge::intent(billing_period, reference_key.clone());

        let recorded = {
            let intent = intent.clone();
            self.store
                .update_at(index, &key, move |s| s.pending_charge = Some(intent))
                .await
        };
        match recorded {
            Ok(Some(_)) => {}
            Ok(None) => {
                return SubscriptionResult::new(&subscription, CycleState::PersistFailed)
                    .with_error("subscription no longer in store")
            }
            Err(e) => {
                error!(subscription = %key, error = %e, "Charge intent not recorded");
                return SubscriptionResult::new(&subscription, CycleState::PersistFailed)
                    .with_error(e.to_string());
            }
        }

        info!(
            customer_id = %subscription.customer_id,
            product_id = %subscription.product_id,
            amount = %subscription.product_price,
            idempotency_key = %reference_key,
            state = CycleState::Charging.as_str(),
            "Charging subscription"
        );

        let receipt = match self.charge(&subscription, &reference_key).await {
            Ok(receipt) => receipt,
            Err(e) => {
                let cleared = self
                    .store
                    .update_at(index, &key, |s| s.pending_charge = None)
                    .await;
                if let Err(clear) = cleared {
                    error!(subscription = %key, error = %clear, "Charge intent not cleared");
                }
                warn!(
                    customer_id = %subscription.customer_id,
                    product_id = %subscription.product_id,
                    reason = %e.reason(),
                    state = CycleState::ChargeFailed.as_str(),
                    "Charge failed"
                );
                return SubscriptionResult::new(&subscription, CycleState::ChargeFailed)
                    .with_error(e.reason());
            }
        };
        record_charge_amount(
            subscription.subscription_type.as_str(),
            subscription.product_price,
        );

        let captured = intent.captured(&receipt.transaction_id, receipt.auth_code.as_deref());
        if let Err(e) = self
            .store
            .update_at(index, &key, move |s| s.pending_charge = Some(captured))
            .await
        {
            // The intent marker still blocks a second charge.
            error!(
                subscription = %key,
                transaction_id = %receipt.transaction_id,
                error = %e,
                "Captured charge not recorded"
            );
        }

        info!(
            customer_id = %subscription.customer_id,
            transaction_id = %receipt.transaction_id,
            state = CycleState::Ordering.as_str(),
            "Charge captured; creating order"
        );

        let items = [LineItem::single(
            subscription.product_id.clone(),
            subscription.product_price,
        )];
        let metadata = OrderMetadata {
            transaction_id: Some(receipt.transaction_id.clone()),
            reference: Some(reference_key),
        };
        let order = match self
            .orders
            .create_order(&subscription.customer_id, &items, &metadata)
            .await
        {
            Ok(order) => order,
            Err(e) => {
                error!(
                    customer_id = %subscription.customer_id,
                    product_id = %subscription.product_id,
                    transaction_id = %receipt.transaction_id,
                    error = %e,
                    state = CycleState::OrderFailed.as_str(),
                    "Charged but order not created"
                );
                return SubscriptionResult::new(&subscription, CycleState::OrderFailed)
                    .with_transaction(&receipt.transaction_id)
                    .with_error(e.to_string());
            }
        };

        let rescheduled = self
            .store
            .update_at(index, &key, move |s| {
                s.next_billing_date = next_billing_date;
                s.pending_charge = None;
            })
            .await;

        let mut result = match rescheduled {
            Ok(Some(updated)) => {
                info!(
                    customer_id = %subscription.customer_id,
                    product_id = %subscription.product_id,
                    transaction_id = %receipt.transaction_id,
                    order_id = order.order_id,
                    next_billing_date = %updated.next_billing_date,
                    state = CycleState::Rescheduled.as_str(),
                    "Subscription rescheduled"
                );
                SubscriptionResult::new(&updated, CycleState::Rescheduled)
            }
            Ok(None) => SubscriptionResult::new(&subscription, CycleState::PersistFailed)
                .with_error("subscription no longer in store"),
            Err(e) => {
                error!(
                    subscription = %key,
                    order_id = order.order_id,
                    error = %e,
                    "Order created but subscription not rescheduled"
                );
                SubscriptionResult::new(&subscription, CycleState::PersistFailed)
                    .with_error(e.to_string())
            }
        };
        result.transaction_id = Some(receipt.transaction_id);
        result.order_id = Some(order.order_id);
        result
    }

    async fn charge(
        &self,
        subscription: &Subscription,
        reference_key: &str,
    ) -> Result<ChargeReceipt, ChargeError> {
        let profile = ProfileRef::new(
            &subscription.gateway_customer_profile_id,
            &subscription.gateway_payment_profile_id,
        );
        let reference = ChargeReference {
            ref_id: reference_key.to_string(),
            description: Some(format!(
                "{} subscription {}",
                subscription.subscription_type.as_str(),
                subscription.product_id
            )),
        };
        self.gateway
            .charge(&profile, subscription.product_price, Some(&reference))
            .await
    }

    /// Settle subscriptions left with a `pendingCharge` marker.
    ///
    /// Captured charges get their order retried. Intent markers are only
    /// reported: whether the gateway took the money is unknown.
    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    pub async fn reconcile(&self) -> Result<ReconciliationSummary, BillingError> {
        let _guard = self
            .run_guard
            .try_lock()
            .map_err(|_| BillingError::RunInProgress)?;

        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let started_at = Utc::now();

        let subscriptions = match self.store.load_all().await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                error!(error = %e, "Reconciliation aborted: subscriptions not loaded");
                record_billing_run("reconcile", "failed");
                return Err(e.into());
            }
        };

        let mut results = Vec::new();
        for (index, subscription) in subscriptions.iter().enumerate() {
            let Some(marker) = subscription.pending_charge.clone() else {
                continue;
            };
            results.push(self.settle(index, subscription, marker).await);
        }

        let summary = ReconciliationSummary::new(run_id, started_at, results);
        record_billing_run("reconcile", "completed");
        info!(
            resolved = summary.resolved,
            pending = summary.pending,
            unresolved = summary.unresolved,
            "Reconciliation completed"
        );
        Ok(summary)
    }

    async fn settle(
        &self,
        index: usize,
        subscription: &Subscription,
        marker: PendingCharge,
    ) -> ReconciliationResult {
        let key = subscription.key();
        let mut result = ReconciliationResult {
            customer_id: subscription.customer_id.clone(),
            product_id: subscription.product_id.clone(),
            outcome: ReconciliationOutcome::Pending,
            idempotency_key: marker.idempotency_key.clone(),
            transaction_id: marker.transaction_id.clone(),
            order_id: None,
            next_billing_date: subscription.next_billing_date,
            error: None,
        };

        let transaction_id = match (marker.state, marker.transaction_id.as_deref()) {
            (ChargeState::Captured, Some(transaction_id)) => transaction_id.to_string(),
            _ => {
                warn!(
                    subscription = %key,
                    idempotency_key = %marker.idempotency_key,
                    "Charge outcome unknown; verify against the gateway"
                );
                result.outcome = ReconciliationOutcome::Unresolved;
                result.error = Some(format!(
                    "charge outcome unknown; look up invoice {} at the gateway",
                    marker.idempotency_key
                ));
                return result;
            }
        };

        let Some(next_billing_date) = subscription.next_billing_date_after_charge(&self.intervals)
        else {
            result.error = Some("next billing date out of range".to_string());
            return result;
        };

        let items = [LineItem::single(
            subscription.product_id.clone(),
            subscription.product_price,
        )];
        let metadata = OrderMetadata {
            transaction_id: Some(transaction_id.clone()),
            reference: Some(marker.idempotency_key.clone()),
        };
        let order = match self
            .orders
            .create_order(&subscription.customer_id, &items, &metadata)
            .await
        {
            Ok(order) => order,
            Err(e) => {
                warn!(
                    subscription = %key,
                    transaction_id = %transaction_id,
                    error = %e,
                    "Order retry failed"
                );
                result.error = Some(e.to_string());
                return result;
            }
        };
        result.order_id = Some(order.order_id);

        match self
            .store
            .update_at(index, &key, move |s| {
                s.next_billing_date = next_billing_date;
                s.pending_charge = None;
            })
            .await
        {
            Ok(Some(updated)) => {
                info!(
                    subscription = %key,
                    transaction_id = %transaction_id,
                    order_id = order.order_id,
                    next_billing_date = %updated.next_billing_date,
                    "Captured charge reconciled"
                );
                result.outcome = ReconciliationOutcome::Resolved;
                result.next_billing_date = updated.next_billing_date;
            }
            Ok(None) => result.error = Some("subscription no longer in store".to_string()),
            Err(e) => {
                error!(
                    subscription = %key,
                    order_id = order.order_id,
                    error = %e,
                    "Reconciled order not recorded"
                );
                result.error = Some(e.to_string());
            }
        }
        result
    }
}
