//! HTTP API server for the drone-delivery order service.
//!
//! Provides REST endpoints for placing and managing orders, drone arm/start
//! controls and a per-order server-sent event stream, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use delivery::{DeliveryConfig, DeliveryEngine};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::OrderStore;
use saga::{InMemoryPaymentGateway, InMemoryProductCatalog, SagaCoordinator};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::{AppState, SharedCatalog, SharedPayment};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: OrderStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            get(routes::orders::list::<S>).post(routes::orders::create::<S>),
        )
        .route(
            "/orders/{id}",
            get(routes::orders::get::<S>)
                .patch(routes::orders::update_status::<S>)
                .delete(routes::orders::delete::<S>),
        )
        .route("/orders/{id}/events", get(routes::events::stream::<S>))
        .route("/orders/{id}/drone/arm", post(routes::drone::arm::<S>))
        .route("/orders/{id}/drone/start", post(routes::drone::start::<S>))
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

/// Wires the saga and the delivery engine around one store and one set of
/// collaborators.
pub fn create_state<S: OrderStore + Clone + 'static>(
    store: S,
    catalog: SharedCatalog,
    payment: SharedPayment,
    delivery_config: DeliveryConfig,
) -> Arc<AppState<S>> {
    let saga_coordinator = SagaCoordinator::new(store.clone(), catalog.clone(), payment);
    let delivery = DeliveryEngine::new(store.clone(), catalog, delivery_config);

    Arc::new(AppState {
        store,
        saga_coordinator,
        delivery,
    })
}

/// Creates application state backed by in-memory collaborators.
///
/// The returned catalog and payment handles share state with the app, so
/// callers can seed products and toggle failures.
pub fn create_default_state<S: OrderStore + Clone + 'static>(
    store: S,
    delivery_config: DeliveryConfig,
) -> (
    Arc<AppState<S>>,
    InMemoryProductCatalog,
    InMemoryPaymentGateway,
) {
    let catalog = InMemoryProductCatalog::new();
    let payment = InMemoryPaymentGateway::new();

    let state = create_state(
        store,
        Arc::new(catalog.clone()),
        Arc::new(payment.clone()),
        delivery_config,
    );

    (state, catalog, payment)
}
