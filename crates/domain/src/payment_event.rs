//! Inbound payment processor notifications.

use chrono::{DateTime, Utc};
use common::EventId;
use serde::{Deserialize, Serialize};

use crate::booking::IntentRef;

/// Outcome carried by a payment event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
}

impl std::fmt::Display for PaymentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentOutcome::Succeeded => write!(f, "succeeded"),
            PaymentOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// An asynchronous notification from the payment processor.
///
/// Delivery is at-least-once, possibly out of order and duplicated; the
/// `event_id` is the deduplication key. Events are persisted append-only
/// for audit and never mutated after ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Processor-assigned event identifier (deduplication key).
    pub event_id: EventId,
    /// The payment intent this event settles.
    pub intent_ref: IntentRef,
    /// Charge outcome.
    pub outcome: PaymentOutcome,
    /// Raw payload as received, kept for audit.
    pub payload: serde_json::Value,
    /// Ingestion timestamp.
    pub received_at: DateTime<Utc>,
}

impl PaymentEvent {
    /// Creates an event record from its parsed fields.
    pub fn new(
        event_id: EventId,
        intent_ref: IntentRef,
        outcome: PaymentOutcome,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id,
            intent_ref,
            outcome,
            payload,
            received_at: Utc::now(),
        }
    }
}
