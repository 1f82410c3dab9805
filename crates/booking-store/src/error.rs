use common::{BookingId, SlotId};
use domain::PaymentStatus;
use thiserror::Error;

/// Errors that can occur when interacting with the booking store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The slot was full at evaluation time; the conditional increment
    /// did not apply. A business-expected negative outcome.
    #[error("Slot {slot_id} is fully booked")]
    CapacityExceeded { slot_id: SlotId },

    /// The booking was not found.
    #[error("Booking not found: {0}")]
    BookingNotFound(BookingId),

    /// No booking carries this payment intent reference.
    #[error("No booking for payment intent: {0}")]
    IntentNotFound(String),

    /// The slot was not found.
    #[error("Slot not found: {0}")]
    SlotNotFound(SlotId),

    /// A conditional update observed a different payment status than the
    /// caller expected; the caller should re-read and re-drive.
    #[error(
        "Payment status conflict for booking {booking_id}: expected {expected}, found {actual}"
    )]
    StateConflict {
        booking_id: BookingId,
        expected: PaymentStatus,
        actual: PaymentStatus,
    },

    /// Another booking already carries this payment intent reference.
    #[error("Duplicate payment intent reference: {0}")]
    DuplicateIntent(String),

    /// A persisted row could not be decoded back into a domain value.
    #[error("Corrupt stored value: {0}")]
    Decode(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
