//! Webhook reconciliation: turning processor events into booking state.
//!
//! Delivery is at-least-once and unordered. The reconciler verifies the
//! signature, records the event for deduplication, and applies it through
//! the store's conditional updates, so a redelivered or concurrent event
//! can never settle a payment twice.

use std::sync::Arc;

use booking_store::{BookingStore, SettleOutcome, StoreError};
use common::EventId;
use domain::{Booking, IntentRef, PaymentEvent, PaymentOutcome};
use serde::Deserialize;

use crate::error::{EngineError, Result};
use crate::retry::RetryPolicy;
use crate::signature::WebhookVerifier;

/// What ingesting a webhook did.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// The payment settled and the booking confirmed.
    Settled(Booking),

    /// The failure was recorded; the reservation is kept for retry.
    FailureRecorded(Booking),

    /// This event id was already processed; nothing changed.
    Duplicate,

    /// The booking had already settled or moved past settlement.
    NoEffect(Booking),

    /// No booking carries this intent yet; delivery continues in the
    /// background and dead-letters if the booking never appears.
    Deferred,
}

/// Wire shape of a processor event.
#[derive(Debug, Deserialize)]
struct WebhookPayload {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    intent_ref: String,
}

/// Ingests processor webhooks and reconciles them with bookings.
pub struct WebhookReconciler<S> {
    store: Arc<S>,
    verifier: WebhookVerifier,
    retry: RetryPolicy,
}

impl<S> Clone for WebhookReconciler<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            verifier: self.verifier.clone(),
            retry: self.retry.clone(),
        }
    }
}

impl<S> WebhookReconciler<S>
where
    S: BookingStore + 'static,
{
    /// Creates a reconciler.
    pub fn new(store: Arc<S>, verifier: WebhookVerifier, retry: RetryPolicy) -> Self {
        Self {
            store,
            verifier,
            retry,
        }
    }

    /// Ingests a raw webhook delivery.
    ///
    /// The raw body is what was signed, so verification happens before any
    /// parsing. Acknowledgement never waits on a missing booking; that
    /// path is handed to a background retry task.
    #[tracing::instrument(skip(self, payload, signature))]
    pub async fn ingest(&self, payload: &[u8], signature: &str) -> Result<IngestOutcome> {
        metrics::counter!("webhooks_received_total").increment(1);

        if !self.verifier.verify(payload, signature) {
            metrics::counter!("webhooks_rejected_total").increment(1);
            return Err(EngineError::InvalidSignature);
        }

        let event = parse_event(payload)?;

        if !self.store.insert_payment_event(&event).await? {
            tracing::debug!(event_id = %event.event_id, "duplicate event, re-driving transition");
            metrics::counter!("webhooks_duplicate_total").increment(1);
            // The first delivery may have recorded the event and then died
            // before the transition committed. The apply path is conditional
            // either way, so a redelivery re-drives it; an already-applied
            // event falls through to a no-op.
            return match self.apply(&event).await {
                Ok(IngestOutcome::Settled(booking)) => Ok(IngestOutcome::Settled(booking)),
                Ok(_) => Ok(IngestOutcome::Duplicate),
                Err(EngineError::Store(StoreError::IntentNotFound(_))) => {
                    Ok(IngestOutcome::Duplicate)
                }
                Err(err) => Err(err),
            };
        }

        match self.apply(&event).await {
            Ok(outcome) => Ok(outcome),
            Err(EngineError::Store(StoreError::IntentNotFound(_))) => {
                tracing::info!(
                    event_id = %event.event_id,
                    intent_ref = %event.intent_ref,
                    "booking not visible yet, deferring delivery"
                );
                self.spawn_retry(event);
                Ok(IngestOutcome::Deferred)
            }
            Err(err) => Err(err),
        }
    }

    async fn apply(&self, event: &PaymentEvent) -> Result<IngestOutcome> {
        match event.outcome {
            PaymentOutcome::Succeeded => {
                match self.store.settle_payment(&event.intent_ref, event.received_at).await? {
                    SettleOutcome::Settled(booking) => {
                        metrics::counter!("payments_settled_total").increment(1);
                        tracing::info!(booking_id = %booking.id, "payment settled, booking confirmed");
                        Ok(IngestOutcome::Settled(booking))
                    }
                    SettleOutcome::AlreadyPaid(booking) => Ok(IngestOutcome::NoEffect(booking)),
                    SettleOutcome::Superseded(booking) => {
                        tracing::warn!(
                            booking_id = %booking.id,
                            status = %booking.status,
                            "success event arrived after booking left the pending state"
                        );
                        Ok(IngestOutcome::NoEffect(booking))
                    }
                }
            }
            PaymentOutcome::Failed => {
                let booking = self.store.fail_payment(&event.intent_ref).await?;
                metrics::counter!("payments_failed_total").increment(1);
                Ok(IngestOutcome::FailureRecorded(booking))
            }
        }
    }

    fn spawn_retry(&self, event: PaymentEvent) {
        let reconciler = self.clone();
        tokio::spawn(async move {
            reconciler.retry_until_parked(event).await;
        });
    }

    async fn retry_until_parked(&self, event: PaymentEvent) {
        let mut delay = self.retry.base_delay;
        for _ in 0..self.retry.max_attempts {
            tokio::time::sleep(delay).await;
            delay *= 2;

            match self.apply(&event).await {
                Ok(_) => return,
                Err(EngineError::Store(StoreError::IntentNotFound(_))) => continue,
                Err(err) => {
                    tracing::error!(
                        event_id = %event.event_id,
                        error = %err,
                        "deferred delivery failed"
                    );
                    return;
                }
            }
        }

        tracing::warn!(
            event_id = %event.event_id,
            intent_ref = %event.intent_ref,
            "retries exhausted, dead-lettering event"
        );
        metrics::counter!("webhooks_dead_lettered_total").increment(1);
        if let Err(err) = self
            .store
            .push_dead_letter(&event, "no booking carries this intent reference")
            .await
        {
            tracing::error!(event_id = %event.event_id, error = %err, "failed to park event");
        }
    }
}

fn parse_event(payload: &[u8]) -> Result<PaymentEvent> {
    let raw: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| EngineError::InvalidEvent(format!("malformed JSON: {e}")))?;
    let parsed: WebhookPayload = serde_json::from_value(raw.clone())
        .map_err(|e| EngineError::InvalidEvent(format!("missing field: {e}")))?;

    let outcome = match parsed.event_type.as_str() {
        "payment.succeeded" => PaymentOutcome::Succeeded,
        "payment.failed" => PaymentOutcome::Failed,
        other => {
            return Err(EngineError::InvalidEvent(format!(
                "unknown event type: {other}"
            )));
        }
    };

    Ok(PaymentEvent::new(
        EventId::new(parsed.id),
        IntentRef::new(parsed.intent_ref),
        outcome,
        raw,
    ))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use booking_store::InMemoryBookingStore;
    use chrono::{NaiveDate, NaiveTime};
    use domain::{
        Booking, BookingStatus, CommissionRate, CourseId, GolferId, Holes, PaymentStatus,
        PlayerCount, ProId, RateTable, SlotKey, compute_quote,
    };

    use super::*;

    fn reconciler(store: Arc<InMemoryBookingStore>) -> WebhookReconciler<InMemoryBookingStore> {
        WebhookReconciler::new(
            store,
            WebhookVerifier::new("whsec_test"),
            RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(5),
            },
        )
    }

    async fn seeded_booking(store: &InMemoryBookingStore, intent: &str) -> Booking {
        let key = SlotKey {
            pro_id: ProId::new(),
            course_id: CourseId::new("golf-national"),
            date: NaiveDate::from_ymd_opt(2026, 9, 12).unwrap(),
            start_time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
        };
        let slot = store.reserve_slot(&key, 3).await.unwrap();

        let players = PlayerCount::try_new(2).unwrap();
        let quote = compute_quote(
            players,
            Holes::Eighteen,
            &RateTable::default(),
            CommissionRate::from_percent(20),
        );
        let booking = Booking::new(
            GolferId::new(),
            ProId::new(),
            slot.id,
            players,
            Holes::Eighteen,
            quote,
        );
        store.insert_booking(&booking).await.unwrap();
        store
            .attach_intent(booking.id, &IntentRef::new(intent))
            .await
            .unwrap();
        booking
    }

    fn signed(verifier: &WebhookVerifier, body: &str) -> (Vec<u8>, String) {
        let payload = body.as_bytes().to_vec();
        let signature = verifier.sign(&payload);
        (payload, signature)
    }

    #[tokio::test]
    async fn success_event_settles_the_booking() {
        let store = Arc::new(InMemoryBookingStore::new());
        let reconciler = reconciler(store.clone());
        let booking = seeded_booking(&store, "pi_001").await;

        let body = r#"{"id":"evt_001","type":"payment.succeeded","intent_ref":"pi_001"}"#;
        let (payload, signature) = signed(&WebhookVerifier::new("whsec_test"), body);

        let outcome = reconciler.ingest(&payload, &signature).await.unwrap();
        let IngestOutcome::Settled(settled) = outcome else {
            panic!("expected Settled");
        };
        assert_eq!(settled.id, booking.id);
        assert_eq!(settled.status, BookingStatus::Confirmed);
        assert_eq!(settled.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn redelivered_event_is_a_duplicate() {
        let store = Arc::new(InMemoryBookingStore::new());
        let reconciler = reconciler(store.clone());
        seeded_booking(&store, "pi_001").await;

        let body = r#"{"id":"evt_001","type":"payment.succeeded","intent_ref":"pi_001"}"#;
        let (payload, signature) = signed(&WebhookVerifier::new("whsec_test"), body);

        reconciler.ingest(&payload, &signature).await.unwrap();
        let again = reconciler.ingest(&payload, &signature).await.unwrap();
        assert!(matches!(again, IngestOutcome::Duplicate));
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn redelivery_applies_a_recorded_but_unapplied_event() {
        let store = Arc::new(InMemoryBookingStore::new());
        let reconciler = reconciler(store.clone());
        let booking = seeded_booking(&store, "pi_001").await;

        // The event landed in the store but the first delivery died before
        // the transition committed.
        let event = PaymentEvent::new(
            EventId::new("evt_001"),
            IntentRef::new("pi_001"),
            PaymentOutcome::Succeeded,
            serde_json::json!({}),
        );
        assert!(store.insert_payment_event(&event).await.unwrap());

        let body = r#"{"id":"evt_001","type":"payment.succeeded","intent_ref":"pi_001"}"#;
        let (payload, signature) = signed(&WebhookVerifier::new("whsec_test"), body);

        let outcome = reconciler.ingest(&payload, &signature).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Settled(_)));

        let stored = store.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn distinct_event_ids_settle_only_once() {
        let store = Arc::new(InMemoryBookingStore::new());
        let reconciler = reconciler(store.clone());
        seeded_booking(&store, "pi_001").await;

        let verifier = WebhookVerifier::new("whsec_test");
        let first = r#"{"id":"evt_001","type":"payment.succeeded","intent_ref":"pi_001"}"#;
        let second = r#"{"id":"evt_002","type":"payment.succeeded","intent_ref":"pi_001"}"#;

        let (payload, signature) = signed(&verifier, first);
        let outcome = reconciler.ingest(&payload, &signature).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Settled(_)));

        // The processor retried with a fresh event id; the booking state
        // does not move again.
        let (payload, signature) = signed(&verifier, second);
        let outcome = reconciler.ingest(&payload, &signature).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::NoEffect(_)));
    }

    #[tokio::test]
    async fn failure_event_keeps_the_reservation() {
        let store = Arc::new(InMemoryBookingStore::new());
        let reconciler = reconciler(store.clone());
        let booking = seeded_booking(&store, "pi_001").await;

        let body = r#"{"id":"evt_001","type":"payment.failed","intent_ref":"pi_001"}"#;
        let (payload, signature) = signed(&WebhookVerifier::new("whsec_test"), body);

        let outcome = reconciler.ingest(&payload, &signature).await.unwrap();
        let IngestOutcome::FailureRecorded(failed) = outcome else {
            panic!("expected FailureRecorded");
        };
        assert_eq!(failed.payment_status, PaymentStatus::Failed);
        assert_eq!(failed.status, BookingStatus::Pending);

        let slot = store.get_slot(booking.slot_id).await.unwrap().unwrap();
        assert_eq!(slot.current_bookings, 1);
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_before_parsing() {
        let store = Arc::new(InMemoryBookingStore::new());
        let reconciler = reconciler(store.clone());

        let body = r#"{"id":"evt_001","type":"payment.succeeded","intent_ref":"pi_001"}"#;
        let result = reconciler.ingest(body.as_bytes(), "deadbeef").await;

        assert!(matches!(result, Err(EngineError::InvalidSignature)));
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn malformed_payload_is_invalid_event() {
        let store = Arc::new(InMemoryBookingStore::new());
        let reconciler = reconciler(store);
        let verifier = WebhookVerifier::new("whsec_test");

        let (payload, signature) = signed(&verifier, "not json");
        let result = reconciler.ingest(&payload, &signature).await;
        assert!(matches!(result, Err(EngineError::InvalidEvent(_))));

        let (payload, signature) = signed(&verifier, r#"{"id":"evt_001"}"#);
        let result = reconciler.ingest(&payload, &signature).await;
        assert!(matches!(result, Err(EngineError::InvalidEvent(_))));

        let (payload, signature) = signed(
            &verifier,
            r#"{"id":"evt_001","type":"charge.created","intent_ref":"pi_001"}"#,
        );
        let result = reconciler.ingest(&payload, &signature).await;
        assert!(matches!(result, Err(EngineError::InvalidEvent(_))));
    }

    #[tokio::test]
    async fn unknown_intent_defers_then_settles_when_booking_appears() {
        let store = Arc::new(InMemoryBookingStore::new());
        let reconciler = reconciler(store.clone());

        let body = r#"{"id":"evt_001","type":"payment.succeeded","intent_ref":"pi_001"}"#;
        let (payload, signature) = signed(&WebhookVerifier::new("whsec_test"), body);

        let outcome = reconciler.ingest(&payload, &signature).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Deferred));

        // The booking commits while the retry task is sleeping.
        let booking = seeded_booking(&store, "pi_001").await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        let stored = store.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        assert!(store.list_dead_letters().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn orphaned_event_is_dead_lettered() {
        let store = Arc::new(InMemoryBookingStore::new());
        let reconciler = reconciler(store.clone());

        let body = r#"{"id":"evt_orphan","type":"payment.succeeded","intent_ref":"pi_gone"}"#;
        let (payload, signature) = signed(&WebhookVerifier::new("whsec_test"), body);

        let outcome = reconciler.ingest(&payload, &signature).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Deferred));

        // max_attempts=2 at 5ms base; well settled after 100ms.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let letters = store.list_dead_letters().await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].event.event_id, EventId::new("evt_orphan"));
    }
}
