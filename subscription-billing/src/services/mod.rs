//! Services module for subscription-billing.

pub mod authorize_net;
pub mod bigcommerce;
pub mod billing_cycle;
pub mod metrics;
pub mod store;

pub use authorize_net::{
    AuthorizeNetClient, ChargeReceipt, ChargeReference, ChargeResult, PaymentGateway, ProfileRef,
};
pub use bigcommerce::{BigCommerceClient, LineItem, OrderMetadata, OrderPlatform, OrderReceipt};
pub use billing_cycle::{idempotency_key, BillingCycleDriver};
pub use metrics::{get_metrics, init_metrics};
pub use store::SubscriptionStore;
