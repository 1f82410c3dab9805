//! HTTP route handlers.

pub mod bookings;
pub mod health;
pub mod metrics;
pub mod webhooks;
