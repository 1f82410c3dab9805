//! HTTP API server with observability for the lesson booking platform.
//!
//! Provides REST endpoints for booking management, admin validation, and
//! payment webhook ingestion, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use booking_store::BookingStore;
use domain::{CommissionRate, RateTable};
use engine::{
    BookingService, ExpirySweeper, InMemoryPaymentGateway, RetryPolicy, ValidationWorkflow,
    WebhookReconciler, WebhookVerifier,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::bookings::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: BookingStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/bookings", post(routes::bookings::create::<S>))
        .route("/bookings/{id}", get(routes::bookings::get::<S>))
        .route("/bookings/{id}/cancel", post(routes::bookings::cancel::<S>))
        .route("/bookings/{id}/decision", post(routes::bookings::decide::<S>))
        .route(
            "/bookings/{id}/validation",
            get(routes::bookings::validation::<S>),
        )
        .route("/webhooks/payments", post(routes::webhooks::payments::<S>))
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

/// Creates the default application state plus the expiry sweeper that
/// accompanies it.
pub fn create_default_state<S: BookingStore + 'static>(
    store: S,
    config: &Config,
) -> (Arc<AppState<S>>, ExpirySweeper<S>) {
    let store = Arc::new(store);
    let gateway = Arc::new(InMemoryPaymentGateway::new());

    let bookings = BookingService::new(
        store.clone(),
        gateway,
        RateTable::default(),
        CommissionRate::from_basis_points(config.commission_bps),
        config.slot_capacity,
    );
    let validations = ValidationWorkflow::new(store.clone());
    let reconciler = WebhookReconciler::new(
        store.clone(),
        WebhookVerifier::new(config.webhook_secret.clone()),
        RetryPolicy::default(),
    );
    let sweeper = ExpirySweeper::new(
        store.clone(),
        chrono::Duration::minutes(config.expiry_minutes),
    );

    let state = Arc::new(AppState {
        bookings,
        validations,
        reconciler,
        store,
    });

    (state, sweeper)
}
