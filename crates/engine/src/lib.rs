//! Booking lifecycle and payment reconciliation engine.
//!
//! This crate orchestrates the marketplace workflows on top of the store's
//! atomic conditional updates:
//! 1. Create a booking: reserve capacity, price the lesson, open a payment
//!    intent (compensating the reservation if the gateway fails).
//! 2. Reconcile processor webhooks into exactly-once payment settlement.
//! 3. Record admin validation decisions, one per paid booking.
//! 4. Cancel bookings refund-first, and sweep abandoned checkouts.

pub mod booking;
pub mod error;
pub mod gateway;
pub mod reconciler;
pub mod retry;
pub mod signature;
pub mod sweeper;
pub mod validation;

pub use booking::{BookingService, CreatedBooking, NewBooking};
pub use error::{EngineError, Result};
pub use gateway::{InMemoryPaymentGateway, PaymentGateway, PaymentIntent};
pub use reconciler::{IngestOutcome, WebhookReconciler};
pub use retry::RetryPolicy;
pub use signature::WebhookVerifier;
pub use sweeper::ExpirySweeper;
pub use validation::ValidationWorkflow;
