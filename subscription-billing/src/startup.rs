//! Application startup and lifecycle management.

use crate::config::BillingConfig;
use crate::handlers;
use crate::services::{
    init_metrics, AuthorizeNetClient, BigCommerceClient, BillingCycleDriver, OrderPlatform,
    PaymentGateway, SubscriptionStore,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::{request_id_middleware, REQUEST_ID_HEADER};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BillingConfig>,
    pub store: Arc<SubscriptionStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub driver: Arc<BillingCycleDriver>,
}

impl AppState {
    pub fn new(
        config: BillingConfig,
        gateway: Arc<dyn PaymentGateway>,
        orders: Arc<dyn OrderPlatform>,
    ) -> Self {
        let store = Arc::new(SubscriptionStore::new(
            config.storage.subscriptions_path.clone(),
        ));
        let driver = Arc::new(BillingCycleDriver::new(
            store.clone(),
            gateway.clone(),
            orders,
            config.billing.intervals,
        ));
        Self {
            config: Arc::new(config),
            store,
            gateway,
            driver,
        }
    }
}

/// Build the vendor clients from configuration.
pub fn build_clients(
    config: &BillingConfig,
) -> Result<(Arc<dyn PaymentGateway>, Arc<dyn OrderPlatform>), AppError> {
    let authorize_net = AuthorizeNetClient::new(config.authorize_net.clone())
        .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;
    if authorize_net.is_configured() {
        tracing::info!(
            endpoint = %config.authorize_net.endpoint,
            "Authorize.Net client initialized"
        );
    } else {
        tracing::warn!("Authorize.Net credentials not configured - charges will fail");
    }

    let bigcommerce =
        BigCommerceClient::new(config.bigcommerce.clone(), config.billing.order_status_id)
            .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;
    if bigcommerce.is_configured() {
        tracing::info!(
            store_hash = %config.bigcommerce.store_hash,
            "BigCommerce client initialized"
        );
    } else {
        tracing::warn!("BigCommerce store not configured - orders will fail");
    }

    Ok((Arc::new(authorize_net), Arc::new(bigcommerce)))
}

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route(
            "/process-subscriptions",
            post(handlers::billing::process_subscriptions),
        )
        .route(
            "/reconcile-subscriptions",
            post(handlers::billing::reconcile_subscriptions),
        )
        .route(
            "/subscribe",
            post(handlers::subscriptions::create_subscription),
        )
        .route(
            "/subscriptions",
            get(handlers::subscriptions::list_subscriptions),
        )
        .route("/payment", post(handlers::payments::charge_profile));

    with_http_layers(routes).with_state(state)
}

/// Request-id outermost so the trace span sees the id it assigns.
fn with_http_layers<S>(routes: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    routes
        .layer(middleware::from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(middleware::from_fn(request_id_middleware))
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the production vendor clients.
    pub async fn build(config: BillingConfig) -> Result<Self, AppError> {
        let (gateway, orders) = build_clients(&config)?;
        Self::build_with(config, gateway, orders).await
    }

    /// Build the application around the given vendor clients.
    pub async fn build_with(
        config: BillingConfig,
        gateway: Arc<dyn PaymentGateway>,
        orders: Arc<dyn OrderPlatform>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let http_addr = config.common.socket_addr()?;
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(
            http_port = http_port,
            subscriptions_file = %config.storage.subscriptions_path.display(),
            "Subscription billing listener bound"
        );

        Ok(Self {
            http_port,
            http_listener,
            state: AppState::new(config, gateway, orders),
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let http_router = router(self.state);

        tracing::info!(
            service = "subscription-billing",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, http_router)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "HTTP server error");
                std::io::Error::other(format!("HTTP server error: {}", e))
            })
    }
}
