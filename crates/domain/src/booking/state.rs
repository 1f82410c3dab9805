//! Booking lifecycle state machines.

use serde::{Deserialize, Serialize};

/// Operational status of a booking.
///
/// State transitions:
/// ```text
/// Pending ──► Confirmed
///    │            │
///    └────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BookingStatus {
    /// Capacity reserved, payment not yet settled.
    #[default]
    Pending,

    /// Payment settled; booking holds its table slot.
    Confirmed,

    /// Booking was cancelled (terminal state).
    Cancelled,
}

impl BookingStatus {
    /// Returns true if the booking can be confirmed in this state.
    pub fn can_confirm(&self) -> bool {
        matches!(self, BookingStatus::Pending)
    }

    /// Returns true if the booking can be cancelled in this state.
    pub fn can_cancel(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "Pending",
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Financial status of a booking.
///
/// `Paid` is reached at most once, regardless of how many times the
/// external payment event is redelivered; the store enforces this with a
/// conditional update.
///
/// ```text
/// Pending ──┬──► Paid ──► Refunded
///           └──► Failed ──► Paid (payment retry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    /// Awaiting the payment processor's verdict.
    #[default]
    Pending,

    /// Payment settled.
    Paid,

    /// Last payment attempt failed; the reservation is kept so the
    /// golfer can retry.
    Failed,

    /// Payment was returned after cancellation (terminal state).
    Refunded,
}

impl PaymentStatus {
    /// Returns true if the payment can transition to `Paid`.
    pub fn can_mark_paid(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Failed)
    }

    /// Returns true if the payment can transition to `Failed`.
    pub fn can_mark_failed(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Failed)
    }

    /// Returns true if a refund applies on cancellation.
    pub fn needs_refund(&self) -> bool {
        matches!(self, PaymentStatus::Paid)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Refunded)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_states_are_pending() {
        assert_eq!(BookingStatus::default(), BookingStatus::Pending);
        assert_eq!(PaymentStatus::default(), PaymentStatus::Pending);
    }

    #[test]
    fn pending_can_confirm() {
        assert!(BookingStatus::Pending.can_confirm());
        assert!(!BookingStatus::Confirmed.can_confirm());
        assert!(!BookingStatus::Cancelled.can_confirm());
    }

    #[test]
    fn can_cancel_from_non_terminal_states() {
        assert!(BookingStatus::Pending.can_cancel());
        assert!(BookingStatus::Confirmed.can_cancel());
        assert!(!BookingStatus::Cancelled.can_cancel());
    }

    #[test]
    fn cancelled_is_terminal() {
        assert!(!BookingStatus::Pending.is_terminal());
        assert!(!BookingStatus::Confirmed.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
    }

    #[test]
    fn paid_is_reached_from_pending_or_failed() {
        assert!(PaymentStatus::Pending.can_mark_paid());
        assert!(PaymentStatus::Failed.can_mark_paid());
        assert!(!PaymentStatus::Paid.can_mark_paid());
        assert!(!PaymentStatus::Refunded.can_mark_paid());
    }

    #[test]
    fn only_paid_needs_refund() {
        assert!(!PaymentStatus::Pending.needs_refund());
        assert!(PaymentStatus::Paid.needs_refund());
        assert!(!PaymentStatus::Failed.needs_refund());
        assert!(!PaymentStatus::Refunded.needs_refund());
    }

    #[test]
    fn display() {
        assert_eq!(BookingStatus::Confirmed.to_string(), "Confirmed");
        assert_eq!(PaymentStatus::Refunded.to_string(), "Refunded");
    }

    #[test]
    fn serialization_roundtrip() {
        let status = PaymentStatus::Paid;
        let json = serde_json::to_string(&status).unwrap();
        let deserialized: PaymentStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(status, deserialized);
    }
}
