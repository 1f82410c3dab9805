//! Expiry sweep for abandoned checkouts.

use std::sync::Arc;
use std::time::Duration;

use booking_store::BookingStore;
use domain::Booking;

use crate::error::Result;

/// Cancels bookings whose payment never arrived.
///
/// A booking that is still fully pending past the expiry window is an
/// abandoned checkout holding capacity hostage; the sweep cancels it and
/// releases the slot. Paid and failed-payment bookings are never swept.
#[derive(Clone)]
pub struct ExpirySweeper<S> {
    store: Arc<S>,
    window: chrono::Duration,
}

impl<S> ExpirySweeper<S>
where
    S: BookingStore,
{
    /// Creates a sweeper with the given expiry window.
    pub fn new(store: Arc<S>, window: chrono::Duration) -> Self {
        Self { store, window }
    }

    /// Runs one sweep and returns the bookings it expired.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_once(&self) -> Result<Vec<Booking>> {
        let cutoff = chrono::Utc::now() - self.window;
        let expired = self.store.expire_pending_bookings(cutoff).await?;

        if !expired.is_empty() {
            metrics::counter!("bookings_expired_total").increment(expired.len() as u64);
            tracing::info!(count = expired.len(), "expired abandoned bookings");
        }

        Ok(expired)
    }

    /// Runs the sweep on an interval until the task is dropped.
    pub async fn run(self, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        // The first tick fires immediately; skip it so a fresh deploy does
        // not sweep while traffic is still settling in.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(err) = self.sweep_once().await {
                tracing::error!(error = %err, "expiry sweep failed");
            }
        }
    }
}
