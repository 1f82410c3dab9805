//! Engine error types.

use booking_store::StoreError;
use common::BookingId;
use domain::BookingError;
use thiserror::Error;

/// Errors that can occur during booking engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The request failed validation before touching any state.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The slot's capacity was consumed by concurrent bookings.
    #[error("Slot is fully booked")]
    CapacityExceeded,

    /// An inbound webhook payload could not be understood.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// The webhook signature did not match the shared secret.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// A racing reviewer already decided this validation.
    #[error("Validation decision has already been recorded")]
    AlreadyDecided,

    /// Booking not found.
    #[error("Booking not found: {0}")]
    BookingNotFound(BookingId),

    /// The payment gateway could not be reached or declined the call.
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Domain rule violation.
    #[error("Domain error: {0}")]
    Domain(#[from] BookingError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CapacityExceeded { .. } => EngineError::CapacityExceeded,
            StoreError::BookingNotFound(id) => EngineError::BookingNotFound(id),
            other => EngineError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
