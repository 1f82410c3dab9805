//! The booking record and its guarded transitions.

use chrono::{DateTime, Utc};
use common::{BookingId, SlotId};
use serde::{Deserialize, Serialize};

use crate::pricing::{Holes, PlayerCount, Quote};
use crate::validation::ValidationStatus;

use super::{BookingError, BookingStatus, GolferId, IntentRef, PaymentStatus, ProId};

/// One reservation of a table slot for a lesson.
///
/// A booking is never hard-deleted; cancellation is a state. The methods
/// here encode the legal transitions, but callers must persist them through
/// the store's conditional updates — two replicas mutating copies of the
/// same booking are arbitrated by the store, not by this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    /// Unique booking identifier.
    pub id: BookingId,

    /// Golfer who requested the lesson.
    pub golfer_id: GolferId,

    /// Teaching pro providing the lesson.
    pub pro_id: ProId,

    /// The availability slot this booking holds capacity in.
    pub slot_id: SlotId,

    /// Players sharing the slot (1..=3).
    pub players: PlayerCount,

    /// Lesson length.
    pub holes: Holes,

    /// Price breakdown computed at creation, commission snapshot included.
    pub quote: Quote,

    /// External payment intent reference, unique once attached.
    pub intent_ref: Option<IntentRef>,

    /// Financial status.
    pub payment_status: PaymentStatus,

    /// Operational status.
    pub status: BookingStatus,

    /// Admin approval gate, opened once payment succeeds.
    pub validation_status: ValidationStatus,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Set when the booking reaches `Confirmed`.
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Creates a new booking in all-pending state.
    pub fn new(
        golfer_id: GolferId,
        pro_id: ProId,
        slot_id: SlotId,
        players: PlayerCount,
        holes: Holes,
        quote: Quote,
    ) -> Self {
        Self {
            id: BookingId::new(),
            golfer_id,
            pro_id,
            slot_id,
            players,
            holes,
            quote,
            intent_ref: None,
            payment_status: PaymentStatus::Pending,
            status: BookingStatus::Pending,
            validation_status: ValidationStatus::Pending,
            created_at: Utc::now(),
            confirmed_at: None,
        }
    }

    /// Attaches the payment intent opened for this booking.
    pub fn attach_intent(&mut self, intent_ref: IntentRef) -> Result<(), BookingError> {
        if let Some(existing) = &self.intent_ref {
            return Err(BookingError::IntentAlreadyAttached {
                intent_ref: existing.to_string(),
            });
        }
        self.intent_ref = Some(intent_ref);
        Ok(())
    }

    /// Settles the payment and confirms the booking.
    ///
    /// Legal only while the payment has not already settled; the store's
    /// conditional update makes this exactly-once under redelivery.
    pub fn mark_paid(&mut self, at: DateTime<Utc>) -> Result<(), BookingError> {
        if !self.payment_status.can_mark_paid() {
            return Err(BookingError::InvalidPaymentTransition {
                payment_status: self.payment_status,
                action: "mark paid",
            });
        }
        if !self.status.can_confirm() {
            return Err(BookingError::InvalidStateTransition {
                current_state: self.status,
                action: "confirm",
            });
        }
        self.payment_status = PaymentStatus::Paid;
        self.status = BookingStatus::Confirmed;
        self.confirmed_at = Some(at);
        Ok(())
    }

    /// Records a failed payment attempt.
    ///
    /// The reservation is kept; the golfer may retry payment, and capacity
    /// release is handled by explicit cancellation or the expiry sweep.
    pub fn mark_payment_failed(&mut self) -> Result<(), BookingError> {
        if !self.payment_status.can_mark_failed() {
            return Err(BookingError::InvalidPaymentTransition {
                payment_status: self.payment_status,
                action: "mark failed",
            });
        }
        self.payment_status = PaymentStatus::Failed;
        Ok(())
    }

    /// Cancels the booking, recording whether a refund was issued.
    pub fn cancel(&mut self, refunded: bool) -> Result<(), BookingError> {
        if !self.status.can_cancel() {
            return Err(BookingError::InvalidStateTransition {
                current_state: self.status,
                action: "cancel",
            });
        }
        if refunded {
            self.payment_status = PaymentStatus::Refunded;
        }
        self.status = BookingStatus::Cancelled;
        Ok(())
    }

    /// Returns true if the booking still holds reserved capacity.
    pub fn holds_capacity(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Returns true if the booking is an abandoned checkout: still fully
    /// pending and created before the given cutoff.
    pub fn is_expired_at(&self, cutoff: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Pending
            && self.payment_status == PaymentStatus::Pending
            && self.created_at < cutoff
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use crate::pricing::{CommissionRate, RateTable, compute_quote};

    use super::*;

    fn test_booking() -> Booking {
        let players = PlayerCount::try_new(2).unwrap();
        let quote = compute_quote(
            players,
            Holes::Eighteen,
            &RateTable::default(),
            CommissionRate::from_percent(20),
        );
        Booking::new(
            GolferId::new(),
            ProId::new(),
            SlotId::new(),
            players,
            Holes::Eighteen,
            quote,
        )
    }

    #[test]
    fn new_booking_is_all_pending() {
        let booking = test_booking();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.payment_status, PaymentStatus::Pending);
        assert_eq!(booking.validation_status, ValidationStatus::Pending);
        assert!(booking.intent_ref.is_none());
        assert!(booking.confirmed_at.is_none());
    }

    #[test]
    fn attach_intent_twice_fails() {
        let mut booking = test_booking();
        booking.attach_intent(IntentRef::new("pi_001")).unwrap();

        let result = booking.attach_intent(IntentRef::new("pi_002"));
        assert!(matches!(
            result,
            Err(BookingError::IntentAlreadyAttached { .. })
        ));
        assert_eq!(booking.intent_ref, Some(IntentRef::new("pi_001")));
    }

    #[test]
    fn mark_paid_confirms_booking() {
        let mut booking = test_booking();
        let now = Utc::now();
        booking.mark_paid(now).unwrap();

        assert_eq!(booking.payment_status, PaymentStatus::Paid);
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.confirmed_at, Some(now));
    }

    #[test]
    fn mark_paid_twice_fails() {
        let mut booking = test_booking();
        booking.mark_paid(Utc::now()).unwrap();

        let result = booking.mark_paid(Utc::now());
        assert!(matches!(
            result,
            Err(BookingError::InvalidPaymentTransition { .. })
        ));
    }

    #[test]
    fn failed_payment_keeps_reservation() {
        let mut booking = test_booking();
        booking.mark_payment_failed().unwrap();

        assert_eq!(booking.payment_status, PaymentStatus::Failed);
        assert_eq!(booking.status, BookingStatus::Pending);
        assert!(booking.holds_capacity());
    }

    #[test]
    fn paid_after_failed_retry() {
        let mut booking = test_booking();
        booking.mark_payment_failed().unwrap();
        booking.mark_paid(Utc::now()).unwrap();

        assert_eq!(booking.payment_status, PaymentStatus::Paid);
        assert_eq!(booking.status, BookingStatus::Confirmed);
    }

    #[test]
    fn cancel_paid_booking_records_refund() {
        let mut booking = test_booking();
        booking.mark_paid(Utc::now()).unwrap();
        booking.cancel(true).unwrap();

        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert_eq!(booking.payment_status, PaymentStatus::Refunded);
        assert!(!booking.holds_capacity());
    }

    #[test]
    fn cancel_unpaid_booking_skips_refund() {
        let mut booking = test_booking();
        booking.cancel(false).unwrap();

        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert_eq!(booking.payment_status, PaymentStatus::Pending);
    }

    #[test]
    fn cancel_twice_fails() {
        let mut booking = test_booking();
        booking.cancel(false).unwrap();

        let result = booking.cancel(false);
        assert!(matches!(
            result,
            Err(BookingError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn expiry_applies_only_to_fully_pending_bookings() {
        let mut booking = test_booking();
        let future = Utc::now() + Duration::minutes(31);
        assert!(booking.is_expired_at(future));

        booking.mark_paid(Utc::now()).unwrap();
        assert!(!booking.is_expired_at(future));
    }

    #[test]
    fn serialization_roundtrip() {
        let booking = test_booking();
        let json = serde_json::to_string(&booking).unwrap();
        let deserialized: Booking = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.id, booking.id);
        assert_eq!(deserialized.quote, booking.quote);
    }
}
