use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BookingId, EventId};
use domain::{
    Booking, Decision, IntentRef, PaymentEvent, PaymentStatus, Slot, SlotKey, ValidationRecord,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

/// Outcome of the conditional payment settlement.
#[derive(Debug, Clone)]
pub enum SettleOutcome {
    /// The transition applied: payment is now `Paid`, the booking
    /// `Confirmed`, and an undecided validation record was opened.
    Settled(Booking),

    /// The payment had already settled; nothing changed. Expected under
    /// at-least-once webhook delivery.
    AlreadyPaid(Booking),

    /// The booking reached a state where settlement no longer applies
    /// (cancelled or refunded before the event arrived).
    Superseded(Booking),
}

/// Outcome of the conditional admin decision write.
#[derive(Debug, Clone)]
pub enum DecisionOutcome {
    /// The decision was recorded; the gate is now closed.
    Recorded(ValidationRecord),

    /// A decision already exists; the write did not apply.
    AlreadyDecided(ValidationRecord),

    /// The booking has not reached `Paid`, so there is no open gate.
    NotPaid,
}

/// Outcome of the compare-and-cancel operation.
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    /// The booking was cancelled and its slot capacity released.
    Cancelled(Booking),

    /// The booking was already cancelled; nothing changed.
    AlreadyCancelled(Booking),
}

/// A payment event that exhausted its delivery retries without finding
/// its booking, parked for operator replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// The undeliverable event.
    pub event: PaymentEvent,
    /// Why delivery gave up.
    pub reason: String,
    /// When the event was parked.
    pub parked_at: DateTime<Utc>,
}

/// Core trait for booking store implementations.
///
/// Every method documented as *conditional* is a single atomic write
/// against the backing store; implementations must not decompose it into
/// a read followed by a write, because concurrent replicas race on these
/// rows.
#[async_trait]
pub trait BookingStore: Send + Sync {
    // -- Slots --

    /// Resolves the slot for a key (creating it empty if absent) and
    /// atomically increments `current_bookings` by one.
    ///
    /// Conditional: fails with `CapacityExceeded` when
    /// `current_bookings == max_players` at evaluation time. One booking
    /// consumes one capacity unit regardless of player count.
    async fn reserve_slot(&self, key: &SlotKey, max_players: u32) -> Result<Slot>;

    /// Atomically decrements a slot's `current_bookings`, floored at zero.
    async fn release_slot(&self, slot_id: common::SlotId) -> Result<()>;

    /// Looks up a slot by key.
    async fn find_slot(&self, key: &SlotKey) -> Result<Option<Slot>>;

    /// Looks up a slot by id.
    async fn get_slot(&self, slot_id: common::SlotId) -> Result<Option<Slot>>;

    // -- Bookings --

    /// Persists a freshly created booking.
    async fn insert_booking(&self, booking: &Booking) -> Result<()>;

    /// Attaches a payment intent reference to a booking that has none.
    ///
    /// Fails with `DuplicateIntent` if another booking already carries the
    /// reference.
    async fn attach_intent(&self, booking_id: BookingId, intent_ref: &IntentRef) -> Result<()>;

    /// Loads a booking by id.
    async fn get_booking(&self, booking_id: BookingId) -> Result<Option<Booking>>;

    /// Loads a booking by its payment intent reference.
    async fn find_booking_by_intent(&self, intent_ref: &IntentRef) -> Result<Option<Booking>>;

    /// Conditional: settles the payment for the booking carrying this
    /// intent reference. Applies only while the payment has not settled;
    /// opens the validation record in the same atomic step. Concurrent
    /// redeliveries observe `AlreadyPaid`.
    async fn settle_payment(
        &self,
        intent_ref: &IntentRef,
        at: DateTime<Utc>,
    ) -> Result<SettleOutcome>;

    /// Conditional: records a failed payment attempt. A no-op once the
    /// payment has settled (a late failure event never un-pays a booking).
    /// Returns the booking as stored afterwards.
    async fn fail_payment(&self, intent_ref: &IntentRef) -> Result<Booking>;

    /// Conditional: cancels a booking and releases its slot capacity in
    /// one atomic step.
    ///
    /// `expected_payment` is the payment status the caller observed when
    /// deciding whether to refund; the write fails with `StateConflict` if
    /// the stored status has moved since, so the caller can re-drive with
    /// the fresh state.
    async fn cancel_booking(
        &self,
        booking_id: BookingId,
        expected_payment: PaymentStatus,
        refunded: bool,
    ) -> Result<CancelOutcome>;

    /// Cancels every fully pending booking created before the cutoff and
    /// releases its capacity. Returns the expired bookings.
    async fn expire_pending_bookings(&self, cutoff: DateTime<Utc>) -> Result<Vec<Booking>>;

    // -- Validation records --

    /// Conditional: records an admin decision on an open validation
    /// record. Only one decision ever persists; a racing second reviewer
    /// observes `AlreadyDecided`.
    async fn record_decision(
        &self,
        booking_id: BookingId,
        reviewer_id: Uuid,
        decision: Decision,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<DecisionOutcome>;

    /// Loads the validation record for a booking.
    async fn get_validation(&self, booking_id: BookingId) -> Result<Option<ValidationRecord>>;

    // -- Payment events (append-only audit, dedup) --

    /// Persists an inbound payment event.
    ///
    /// Returns `false` without writing when an event with the same id was
    /// already ingested — the deduplication check and the insert are one
    /// atomic operation.
    async fn insert_payment_event(&self, event: &PaymentEvent) -> Result<bool>;

    /// Loads a previously ingested payment event.
    async fn get_payment_event(&self, event_id: &EventId) -> Result<Option<PaymentEvent>>;

    // -- Dead letters --

    /// Parks an undeliverable payment event for operator replay.
    async fn push_dead_letter(&self, event: &PaymentEvent, reason: &str) -> Result<()>;

    /// Lists parked events, oldest first.
    async fn list_dead_letters(&self) -> Result<Vec<DeadLetter>>;
}
