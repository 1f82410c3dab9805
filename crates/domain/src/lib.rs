//! Domain layer for the booking engine.
//!
//! This crate provides the core data model and business rules:
//! - Booking record with its three lifecycle state machines
//! - Availability slot with the capacity invariant
//! - Pricing/commission calculator (pure)
//! - Admin validation record and payment event records
//!
//! No I/O happens here; atomicity of state transitions is the
//! responsibility of the store that persists these types.

pub mod booking;
pub mod payment_event;
pub mod pricing;
pub mod slot;
pub mod validation;

pub use booking::{
    Booking, BookingError, BookingStatus, CourseId, GolferId, IntentRef, Money, PaymentStatus,
    ProId,
};
pub use payment_event::{PaymentEvent, PaymentOutcome};
pub use pricing::{CommissionRate, Holes, PlayerCount, Quote, RateTable, compute_quote};
pub use slot::{Slot, SlotKey};
pub use validation::{Decision, ValidationRecord, ValidationStatus};
