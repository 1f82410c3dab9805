//! Shared identifier types used across the booking engine crates.

mod types;

pub use types::{BookingId, EventId, SlotId};
