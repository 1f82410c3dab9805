//! Prometheus scrape endpoint.
//!
//! The booking and reconciliation counters (`bookings_*`, `webhooks_*`,
//! `payments_*`) are recorded by the engine workflows; this endpoint only
//! renders whatever the installed recorder has accumulated.

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

/// GET /metrics — renders the current snapshot in Prometheus text format.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
