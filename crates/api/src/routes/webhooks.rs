//! Payment processor webhook endpoint.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use booking_store::BookingStore;
use engine::{EngineError, IngestOutcome};
use serde::Serialize;

use crate::error::ApiError;
use crate::routes::bookings::AppState;

/// Header carrying the hex HMAC of the raw request body.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

#[derive(Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: &'static str,
}

/// POST /webhooks/payments — ingest a payment processor event.
///
/// The body is taken raw because the signature covers the exact bytes the
/// processor sent. Responses acknowledge quickly; deferred deliveries are
/// completed in the background.
#[tracing::instrument(skip(state, headers, body))]
pub async fn payments<S: BookingStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Engine(EngineError::InvalidSignature))?;

    // An authenticated but malformed or unrecognized event is acknowledged,
    // not rejected; a non-2xx response would only make the processor
    // redeliver it forever.
    let outcome = match state.reconciler.ingest(&body, signature).await {
        Ok(IngestOutcome::Settled(_)) => "settled",
        Ok(IngestOutcome::FailureRecorded(_)) => "failure_recorded",
        Ok(IngestOutcome::Duplicate) => "duplicate",
        Ok(IngestOutcome::NoEffect(_)) => "no_effect",
        Ok(IngestOutcome::Deferred) => "deferred",
        Err(EngineError::InvalidEvent(reason)) => {
            tracing::warn!(%reason, "ignoring unusable payment event");
            "invalid_ignored"
        }
        Err(err) => return Err(err.into()),
    };

    Ok(Json(WebhookAck {
        received: true,
        outcome,
    }))
}
