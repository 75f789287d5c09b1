//! HTTP API server with observability for the storefront fulfillment engine.
//!
//! Provides REST endpoints for checkout, order management, discounts,
//! payments, shipping and carrier webhooks, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    InMemoryCarrier, InMemoryNotifier, InMemoryPaymentGateway, OrderLifecycle, SagaCoordinator,
    ShippingDesk, SignatureVerifier,
};
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

pub type Coordinator<S> =
    SagaCoordinator<S, InMemoryPaymentGateway, InMemoryCarrier, InMemoryNotifier>;
pub type Lifecycle<S> =
    OrderLifecycle<S, InMemoryPaymentGateway, InMemoryCarrier, InMemoryNotifier>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub store: S,
    pub coordinator: Coordinator<S>,
    pub lifecycle: Lifecycle<S>,
    pub shipping: ShippingDesk<InMemoryCarrier>,
}

impl<S: Store> AppState<S> {
    /// Wires the saga and lifecycle to the given store and service clients.
    pub fn new(
        store: S,
        payment: InMemoryPaymentGateway,
        carrier: InMemoryCarrier,
        notifier: InMemoryNotifier,
        config: &Config,
    ) -> Self {
        let settings = config.fulfillment_settings();
        let verifier = SignatureVerifier::new(&config.payment_key_secret);
        let lifecycle = OrderLifecycle::new(
            store.clone(),
            payment.clone(),
            carrier.clone(),
            notifier.clone(),
            &settings,
        );
        let shipping = ShippingDesk::new(
            carrier.clone(),
            settings.shipping,
            settings.external_timeout,
        );
        let coordinator =
            SagaCoordinator::new(store.clone(), payment, carrier, notifier, verifier, settings);
        Self {
            store,
            coordinator,
            lifecycle,
            shipping,
        }
    }
}

/// Creates the default application state with the given store and in-memory
/// service clients.
pub fn create_default_state<S: Store>(store: S, config: &Config) -> Arc<AppState<S>> {
    Arc::new(AppState::new(
        store,
        InMemoryPaymentGateway::new(),
        InMemoryCarrier::with_token_ttl(config.carrier_token_ttl()),
        InMemoryNotifier::new(),
        config,
    ))
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::observability::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::observability::health))
        .route("/checkout", post(routes::checkout::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/status", post(routes::orders::update_status::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route("/orders/{id}/refund", put(routes::orders::update_refund::<S>))
        .route("/discounts/validate", post(routes::discounts::validate::<S>))
        .route("/payments/orders", post(routes::payments::create_order::<S>))
        .route("/shipping/quote", post(routes::shipping::quote::<S>))
        .route("/shipping/track/{code}", get(routes::shipping::track::<S>))
        .route("/webhooks/carrier", post(routes::webhooks::carrier::<S>))
        .route("/admin/products/{id}", put(routes::admin::upsert_product::<S>))
        .route("/admin/promo-codes", put(routes::admin::upsert_promo_code::<S>))
        .route("/admin/referral-codes", put(routes::admin::upsert_referral_code::<S>))
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
