//! Persistence layer for the booking engine.
//!
//! The [`BookingStore`] trait exposes the conditional atomic operations the
//! engine's correctness depends on: slot capacity check-and-increment,
//! exactly-once payment settlement, single-decision validation, and
//! compare-and-cancel. Each implementation guarantees those operations are
//! single atomic writes against its backend — never read-then-write pairs —
//! so concurrent replicas cannot overbook a slot or double-settle a payment.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryBookingStore;
pub use postgres::PostgresBookingStore;
pub use store::{BookingStore, CancelOutcome, DeadLetter, DecisionOutcome, SettleOutcome};
