//! Booking record and related types.

mod record;
mod state;
mod value_objects;

pub use record::Booking;
pub use state::{BookingStatus, PaymentStatus};
pub use value_objects::{CourseId, GolferId, IntentRef, Money, ProId};

use thiserror::Error;

/// Errors that can occur during booking operations.
#[derive(Debug, Error)]
pub enum BookingError {
    /// Player count outside the allowed 1..=3 range.
    #[error("Invalid player count: {players} (must be between 1 and 3)")]
    InvalidPlayerCount { players: u8 },

    /// Holes must be 9 or 18.
    #[error("Invalid hole count: {holes} (must be 9 or 18)")]
    InvalidHoles { holes: u8 },

    /// Booking is not in the expected state for the requested transition.
    #[error("Invalid state transition: cannot {action} from {current_state} state")]
    InvalidStateTransition {
        current_state: BookingStatus,
        action: &'static str,
    },

    /// Payment intent reference already attached.
    #[error("Booking already has a payment intent: {intent_ref}")]
    IntentAlreadyAttached { intent_ref: String },

    /// The booking's payment is not in the expected status.
    #[error("Invalid payment transition: cannot {action} while payment is {payment_status}")]
    InvalidPaymentTransition {
        payment_status: PaymentStatus,
        action: &'static str,
    },
}
