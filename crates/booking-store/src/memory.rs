use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BookingId, EventId, SlotId};
use domain::{
    Booking, Decision, IntentRef, PaymentEvent, PaymentStatus, Slot, SlotKey, ValidationRecord,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{BookingStore, CancelOutcome, DeadLetter, DecisionOutcome, SettleOutcome},
};

#[derive(Default)]
struct State {
    slots: HashMap<SlotId, Slot>,
    slot_ids: HashMap<SlotKey, SlotId>,
    bookings: HashMap<BookingId, Booking>,
    intents: HashMap<IntentRef, BookingId>,
    validations: HashMap<BookingId, ValidationRecord>,
    events: HashMap<EventId, PaymentEvent>,
    dead_letters: Vec<DeadLetter>,
}

/// In-memory booking store for testing and local runs.
///
/// Every conditional operation does its check and its mutation under a
/// single write-lock acquisition, which gives it the same atomicity the
/// PostgreSQL implementation gets from conditional `UPDATE` statements.
#[derive(Clone, Default)]
pub struct InMemoryBookingStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryBookingStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of bookings stored.
    pub async fn booking_count(&self) -> usize {
        self.state.read().await.bookings.len()
    }

    /// Returns the total number of ingested payment events.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }

    /// Clears all stored state.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        *state = State::default();
    }

    fn release_in_place(state: &mut State, slot_id: SlotId) {
        if let Some(slot) = state.slots.get_mut(&slot_id) {
            slot.current_bookings = slot.current_bookings.saturating_sub(1);
        }
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn reserve_slot(&self, key: &SlotKey, max_players: u32) -> Result<Slot> {
        let mut state = self.state.write().await;

        let slot_id = match state.slot_ids.get(key) {
            Some(id) => *id,
            None => {
                let slot = Slot::new(key.clone(), max_players);
                let id = slot.id;
                state.slot_ids.insert(key.clone(), id);
                state.slots.insert(id, slot);
                id
            }
        };

        let slot = state
            .slots
            .get_mut(&slot_id)
            .ok_or(StoreError::SlotNotFound(slot_id))?;

        if !slot.has_capacity() {
            return Err(StoreError::CapacityExceeded { slot_id });
        }

        slot.current_bookings += 1;
        Ok(slot.clone())
    }

    async fn release_slot(&self, slot_id: SlotId) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.slots.contains_key(&slot_id) {
            return Err(StoreError::SlotNotFound(slot_id));
        }
        Self::release_in_place(&mut state, slot_id);
        Ok(())
    }

    async fn find_slot(&self, key: &SlotKey) -> Result<Option<Slot>> {
        let state = self.state.read().await;
        Ok(state
            .slot_ids
            .get(key)
            .and_then(|id| state.slots.get(id))
            .cloned())
    }

    async fn get_slot(&self, slot_id: SlotId) -> Result<Option<Slot>> {
        Ok(self.state.read().await.slots.get(&slot_id).cloned())
    }

    async fn insert_booking(&self, booking: &Booking) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(intent_ref) = &booking.intent_ref {
            state.intents.insert(intent_ref.clone(), booking.id);
        }
        state.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn attach_intent(&self, booking_id: BookingId, intent_ref: &IntentRef) -> Result<()> {
        let mut state = self.state.write().await;

        if state.intents.contains_key(intent_ref) {
            return Err(StoreError::DuplicateIntent(intent_ref.to_string()));
        }

        let booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or(StoreError::BookingNotFound(booking_id))?;

        if let Some(existing) = &booking.intent_ref {
            return Err(StoreError::DuplicateIntent(existing.to_string()));
        }

        booking.intent_ref = Some(intent_ref.clone());
        state.intents.insert(intent_ref.clone(), booking_id);
        Ok(())
    }

    async fn get_booking(&self, booking_id: BookingId) -> Result<Option<Booking>> {
        Ok(self.state.read().await.bookings.get(&booking_id).cloned())
    }

    async fn find_booking_by_intent(&self, intent_ref: &IntentRef) -> Result<Option<Booking>> {
        let state = self.state.read().await;
        Ok(state
            .intents
            .get(intent_ref)
            .and_then(|id| state.bookings.get(id))
            .cloned())
    }

    async fn settle_payment(
        &self,
        intent_ref: &IntentRef,
        at: DateTime<Utc>,
    ) -> Result<SettleOutcome> {
        let mut state = self.state.write().await;

        let booking_id = *state
            .intents
            .get(intent_ref)
            .ok_or_else(|| StoreError::IntentNotFound(intent_ref.to_string()))?;

        let booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or(StoreError::BookingNotFound(booking_id))?;

        if booking.payment_status == PaymentStatus::Paid {
            return Ok(SettleOutcome::AlreadyPaid(booking.clone()));
        }
        if booking.status.is_terminal() || booking.payment_status.is_terminal() {
            return Ok(SettleOutcome::Superseded(booking.clone()));
        }

        booking
            .mark_paid(at)
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        let settled = booking.clone();

        state
            .validations
            .entry(booking_id)
            .or_insert_with(|| ValidationRecord::open(booking_id, at));

        Ok(SettleOutcome::Settled(settled))
    }

    async fn fail_payment(&self, intent_ref: &IntentRef) -> Result<Booking> {
        let mut state = self.state.write().await;

        let booking_id = *state
            .intents
            .get(intent_ref)
            .ok_or_else(|| StoreError::IntentNotFound(intent_ref.to_string()))?;

        let booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or(StoreError::BookingNotFound(booking_id))?;

        // A late failure event never un-pays a settled booking.
        if booking.payment_status.can_mark_failed() {
            booking
                .mark_payment_failed()
                .map_err(|e| StoreError::Decode(e.to_string()))?;
        }

        Ok(booking.clone())
    }

    async fn cancel_booking(
        &self,
        booking_id: BookingId,
        expected_payment: PaymentStatus,
        refunded: bool,
    ) -> Result<CancelOutcome> {
        let mut state = self.state.write().await;

        let booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or(StoreError::BookingNotFound(booking_id))?;

        if booking.status.is_terminal() {
            return Ok(CancelOutcome::AlreadyCancelled(booking.clone()));
        }
        if booking.payment_status != expected_payment {
            return Err(StoreError::StateConflict {
                booking_id,
                expected: expected_payment,
                actual: booking.payment_status,
            });
        }

        booking
            .cancel(refunded)
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        let cancelled = booking.clone();
        let slot_id = cancelled.slot_id;

        Self::release_in_place(&mut state, slot_id);

        Ok(CancelOutcome::Cancelled(cancelled))
    }

    async fn expire_pending_bookings(&self, cutoff: DateTime<Utc>) -> Result<Vec<Booking>> {
        let mut state = self.state.write().await;

        let expired_ids: Vec<BookingId> = state
            .bookings
            .values()
            .filter(|b| b.is_expired_at(cutoff))
            .map(|b| b.id)
            .collect();

        let mut expired = Vec::with_capacity(expired_ids.len());
        for id in expired_ids {
            if let Some(booking) = state.bookings.get_mut(&id) {
                booking
                    .cancel(false)
                    .map_err(|e| StoreError::Decode(e.to_string()))?;
                let slot_id = booking.slot_id;
                expired.push(booking.clone());
                Self::release_in_place(&mut state, slot_id);
            }
        }

        Ok(expired)
    }

    async fn record_decision(
        &self,
        booking_id: BookingId,
        reviewer_id: Uuid,
        decision: Decision,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<DecisionOutcome> {
        let mut state = self.state.write().await;

        let booking = state
            .bookings
            .get(&booking_id)
            .ok_or(StoreError::BookingNotFound(booking_id))?;

        if booking.payment_status != PaymentStatus::Paid {
            return Ok(DecisionOutcome::NotPaid);
        }

        let record = state
            .validations
            .entry(booking_id)
            .or_insert_with(|| ValidationRecord::open(booking_id, at));

        if record.is_decided() {
            return Ok(DecisionOutcome::AlreadyDecided(record.clone()));
        }

        record.reviewer_id = Some(reviewer_id);
        record.decision = Some(decision);
        record.notes = notes;
        record.decided_at = Some(at);
        let recorded = record.clone();

        if let Some(booking) = state.bookings.get_mut(&booking_id) {
            booking.validation_status = decision.resulting_status();
        }

        Ok(DecisionOutcome::Recorded(recorded))
    }

    async fn get_validation(&self, booking_id: BookingId) -> Result<Option<ValidationRecord>> {
        Ok(self
            .state
            .read()
            .await
            .validations
            .get(&booking_id)
            .cloned())
    }

    async fn insert_payment_event(&self, event: &PaymentEvent) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.events.contains_key(&event.event_id) {
            return Ok(false);
        }
        state.events.insert(event.event_id.clone(), event.clone());
        Ok(true)
    }

    async fn get_payment_event(&self, event_id: &EventId) -> Result<Option<PaymentEvent>> {
        Ok(self.state.read().await.events.get(event_id).cloned())
    }

    async fn push_dead_letter(&self, event: &PaymentEvent, reason: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.dead_letters.push(DeadLetter {
            event: event.clone(),
            reason: reason.to_string(),
            parked_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_dead_letters(&self) -> Result<Vec<DeadLetter>> {
        Ok(self.state.read().await.dead_letters.clone())
    }
}
