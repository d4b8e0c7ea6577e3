//! HTTP API server for checkout and order management.
//!
//! Exposes checkout, order queries, status updates and cancellation as
//! JSON endpoints, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use checkout::{
    CheckoutOrchestrator, InMemoryCartProvider, InMemoryPaymentGateway, LogNotifier,
    NotificationDispatcher, RetryPolicy, StubShippingQuoter,
};
use common::Money;
use inventory::InventoryLedger;
use metrics_exporter_prometheus::PrometheusHandle;
use orders::OrderLedger;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<I, L>(state: Arc<AppState<I, L>>, metrics_handle: PrometheusHandle) -> Router
where
    I: InventoryLedger + Clone + 'static,
    L: OrderLedger + Clone + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            post(routes::orders::create::<I, L>).get(routes::orders::list::<I, L>),
        )
        .route("/orders/{id}", get(routes::orders::get::<I, L>))
        .route(
            "/orders/tracking/{number}",
            get(routes::orders::get_by_tracking_number::<I, L>),
        )
        .route(
            "/orders/{id}/status",
            put(routes::orders::update_status::<I, L>),
        )
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<I, L>))
        .route("/carts/{user_id}", put(routes::carts::put::<I, L>))
        .route(
            "/inventory/{product_id}",
            get(routes::inventory::get::<I, L>).put(routes::inventory::put::<I, L>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the orchestrator to the given ledgers and the demo collaborators,
/// and starts the notification worker.
///
/// The worker stops once the returned state is dropped.
pub fn create_default_state<I, L>(
    inventory: I,
    orders: L,
    config: &Config,
) -> (Arc<AppState<I, L>>, JoinHandle<()>)
where
    I: InventoryLedger + Clone + 'static,
    L: OrderLedger + Clone + 'static,
{
    let carts = InMemoryCartProvider::new();
    let payments = InMemoryPaymentGateway::new();
    payments.set_approval_limit(Money::from_cents(config.payment_approval_limit_cents));
    let (dispatcher, worker) = NotificationDispatcher::spawn(
        LogNotifier,
        config.notification_queue_capacity,
        RetryPolicy::default(),
    );

    let checkout = CheckoutOrchestrator::new(
        carts.clone(),
        inventory.clone(),
        StubShippingQuoter::new(),
        payments,
        orders,
        dispatcher,
        config.checkout.clone(),
    );

    let state = Arc::new(AppState {
        checkout,
        carts,
        inventory,
    });
    (state, worker)
}
