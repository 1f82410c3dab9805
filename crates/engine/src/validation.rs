//! Admin validation workflow.

use std::sync::Arc;

use booking_store::{BookingStore, DecisionOutcome};
use common::BookingId;
use domain::{Decision, ValidationRecord};
use uuid::Uuid;

use crate::error::{EngineError, Result};

/// Records admin decisions on paid bookings.
///
/// A validation opens automatically when the payment settles and accepts
/// exactly one decision; the loser of a reviewer race gets
/// `AlreadyDecided` and the stored record is returned unchanged.
#[derive(Clone)]
pub struct ValidationWorkflow<S> {
    store: Arc<S>,
}

impl<S> ValidationWorkflow<S>
where
    S: BookingStore,
{
    /// Creates a validation workflow.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Records a reviewer's decision.
    #[tracing::instrument(skip(self, notes))]
    pub async fn decide(
        &self,
        booking_id: BookingId,
        reviewer_id: Uuid,
        decision: Decision,
        notes: Option<String>,
    ) -> Result<ValidationRecord> {
        let outcome = self
            .store
            .record_decision(booking_id, reviewer_id, decision, notes, chrono::Utc::now())
            .await?;

        match outcome {
            DecisionOutcome::Recorded(record) => {
                metrics::counter!("validations_decided_total").increment(1);
                tracing::info!(%booking_id, ?decision, "validation decided");
                Ok(record)
            }
            DecisionOutcome::AlreadyDecided(_) => Err(EngineError::AlreadyDecided),
            DecisionOutcome::NotPaid => Err(EngineError::InvalidRequest(
                "booking payment has not settled; no validation is open".to_string(),
            )),
        }
    }

    /// Loads the validation record for a booking.
    pub async fn get(&self, booking_id: BookingId) -> Result<ValidationRecord> {
        self.store
            .get_validation(booking_id)
            .await?
            .ok_or(EngineError::BookingNotFound(booking_id))
    }
}

#[cfg(test)]
mod tests {
    use booking_store::InMemoryBookingStore;
    use chrono::{NaiveDate, NaiveTime, Utc};
    use domain::{
        Booking, CommissionRate, CourseId, GolferId, Holes, IntentRef, PlayerCount, ProId,
        RateTable, SlotKey, ValidationStatus, compute_quote,
    };

    use super::*;

    async fn paid_booking(store: &InMemoryBookingStore) -> Booking {
        let key = SlotKey {
            pro_id: ProId::new(),
            course_id: CourseId::new("golf-national"),
            date: NaiveDate::from_ymd_opt(2026, 9, 12).unwrap(),
            start_time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
        };
        let slot = store.reserve_slot(&key, 3).await.unwrap();

        let players = PlayerCount::try_new(1).unwrap();
        let quote = compute_quote(
            players,
            Holes::Nine,
            &RateTable::default(),
            CommissionRate::from_percent(20),
        );
        let booking = Booking::new(
            GolferId::new(),
            ProId::new(),
            slot.id,
            players,
            Holes::Nine,
            quote,
        );
        store.insert_booking(&booking).await.unwrap();
        store
            .attach_intent(booking.id, &IntentRef::new("pi_001"))
            .await
            .unwrap();
        store
            .settle_payment(&IntentRef::new("pi_001"), Utc::now())
            .await
            .unwrap();
        booking
    }

    #[tokio::test]
    async fn approve_closes_the_gate() {
        let store = Arc::new(InMemoryBookingStore::new());
        let workflow = ValidationWorkflow::new(store.clone());
        let booking = paid_booking(&store).await;

        let record = workflow
            .decide(booking.id, Uuid::new_v4(), Decision::Approve, None)
            .await
            .unwrap();
        assert_eq!(record.decision, Some(Decision::Approve));
        assert!(record.decided_at.is_some());

        let stored = store.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.validation_status, ValidationStatus::Approved);
    }

    #[tokio::test]
    async fn racing_reviewers_have_one_winner() {
        let store = Arc::new(InMemoryBookingStore::new());
        let workflow = ValidationWorkflow::new(store.clone());
        let booking = paid_booking(&store).await;

        let mut handles = Vec::new();
        for decision in [Decision::Approve, Decision::Reject] {
            let workflow = workflow.clone();
            handles.push(tokio::spawn(async move {
                workflow
                    .decide(booking.id, Uuid::new_v4(), decision, None)
                    .await
            }));
        }

        let mut recorded = 0;
        let mut already_decided = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => recorded += 1,
                Err(EngineError::AlreadyDecided) => already_decided += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(recorded, 1);
        assert_eq!(already_decided, 1);

        // The stored record carries the winner's verdict only.
        let record = workflow.get(booking.id).await.unwrap();
        assert!(record.is_decided());
    }

    #[tokio::test]
    async fn rejection_keeps_the_booking_confirmed() {
        let store = Arc::new(InMemoryBookingStore::new());
        let workflow = ValidationWorkflow::new(store.clone());
        let booking = paid_booking(&store).await;

        workflow
            .decide(
                booking.id,
                Uuid::new_v4(),
                Decision::Reject,
                Some("wrong course listed".to_string()),
            )
            .await
            .unwrap();

        let stored = store.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.validation_status, ValidationStatus::Rejected);
        // Rejection is a business signal; it cancels nothing by itself.
        assert_eq!(stored.status, domain::BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn unpaid_booking_has_no_open_gate() {
        let store = Arc::new(InMemoryBookingStore::new());
        let workflow = ValidationWorkflow::new(store.clone());

        let key = SlotKey {
            pro_id: ProId::new(),
            course_id: CourseId::new("golf-national"),
            date: NaiveDate::from_ymd_opt(2026, 9, 12).unwrap(),
            start_time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
        };
        let slot = store.reserve_slot(&key, 3).await.unwrap();
        let players = PlayerCount::try_new(1).unwrap();
        let quote = compute_quote(
            players,
            Holes::Nine,
            &RateTable::default(),
            CommissionRate::from_percent(20),
        );
        let booking = Booking::new(
            GolferId::new(),
            ProId::new(),
            slot.id,
            players,
            Holes::Nine,
            quote,
        );
        store.insert_booking(&booking).await.unwrap();

        let result = workflow
            .decide(booking.id, Uuid::new_v4(), Decision::Approve, None)
            .await;
        assert!(matches!(result, Err(EngineError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn unknown_booking_is_not_found() {
        let store = Arc::new(InMemoryBookingStore::new());
        let workflow = ValidationWorkflow::new(store);

        let result = workflow
            .decide(BookingId::new(), Uuid::new_v4(), Decision::Approve, None)
            .await;
        assert!(matches!(result, Err(EngineError::BookingNotFound(_))));
    }
}
