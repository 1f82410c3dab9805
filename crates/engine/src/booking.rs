//! Booking creation and cancellation workflows.

use std::sync::Arc;

use booking_store::{BookingStore, CancelOutcome, StoreError};
use chrono::{NaiveDate, NaiveTime};
use common::BookingId;
use domain::{
    Booking, CommissionRate, CourseId, GolferId, Holes, PlayerCount, ProId, Quote, RateTable,
    SlotKey, compute_quote,
};

use crate::error::{EngineError, Result};
use crate::gateway::PaymentGateway;
use crate::retry::RetryPolicy;

/// How many times a cancellation re-reads state after losing a race to a
/// concurrent payment settlement.
const CANCEL_ATTEMPTS: u32 = 3;

/// Parameters for a new booking request.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub golfer_id: GolferId,
    pub pro_id: ProId,
    pub course_id: CourseId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub players: u8,
    pub holes: u8,
}

/// A freshly created booking plus the client secret the golfer needs to
/// complete payment. The secret is handed out exactly once, here; it is
/// never persisted on the booking record.
#[derive(Debug, Clone)]
pub struct CreatedBooking {
    pub booking: Booking,
    pub client_secret: String,
}

/// Orchestrates the booking lifecycle against the store and the payment
/// gateway.
#[derive(Clone)]
pub struct BookingService<S, G> {
    store: Arc<S>,
    gateway: Arc<G>,
    rate_table: RateTable,
    commission_rate: CommissionRate,
    slot_capacity: u32,
    retry: RetryPolicy,
}

impl<S, G> BookingService<S, G>
where
    S: BookingStore,
    G: PaymentGateway,
{
    /// Creates a booking service.
    pub fn new(
        store: Arc<S>,
        gateway: Arc<G>,
        rate_table: RateTable,
        commission_rate: CommissionRate,
        slot_capacity: u32,
    ) -> Self {
        Self {
            store,
            gateway,
            rate_table,
            commission_rate,
            slot_capacity,
            retry: RetryPolicy::default(),
        }
    }

    /// Overrides the backoff schedule used for gateway calls.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Retries a gateway call on transient unavailability; any other
    /// outcome is returned as-is.
    async fn with_gateway_retry<T, F, Fut>(&self, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = self.retry.base_delay;
        for attempt in 1..self.retry.max_attempts {
            match call().await {
                Err(EngineError::GatewayUnavailable(reason)) => {
                    metrics::counter!("gateway_retries_total").increment(1);
                    tracing::warn!(attempt, %reason, "payment gateway unavailable, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                other => return other,
            }
        }
        call().await
    }

    /// Prices a lesson without reserving anything.
    pub fn quote(&self, players: PlayerCount, holes: Holes) -> Quote {
        compute_quote(players, holes, &self.rate_table, self.commission_rate)
    }

    /// Creates a booking: reserve capacity, persist the record, open a
    /// payment intent.
    ///
    /// Capacity is reserved before the gateway is called; if the gateway
    /// fails, the reservation is compensated by cancelling the booking,
    /// which releases the slot. The caller sees `GatewayUnavailable` and
    /// no capacity stays consumed.
    #[tracing::instrument(skip(self, request), fields(pro_id = %request.pro_id))]
    pub async fn create(&self, request: NewBooking) -> Result<CreatedBooking> {
        metrics::counter!("bookings_create_total").increment(1);

        let players = PlayerCount::try_new(request.players)
            .map_err(|e| EngineError::InvalidRequest(e.to_string()))?;
        let holes = Holes::try_from_u8(request.holes)
            .map_err(|e| EngineError::InvalidRequest(e.to_string()))?;

        let quote = self.quote(players, holes);
        let key = SlotKey {
            pro_id: request.pro_id,
            course_id: request.course_id,
            date: request.date,
            start_time: request.start_time,
        };

        let slot = self.store.reserve_slot(&key, self.slot_capacity).await?;

        let booking = Booking::new(
            request.golfer_id,
            request.pro_id,
            slot.id,
            players,
            holes,
            quote,
        );

        if let Err(err) = self.store.insert_booking(&booking).await {
            // The booking row never landed; release the reservation directly.
            let _ = self.store.release_slot(slot.id).await;
            return Err(err.into());
        }

        let intent = match self
            .with_gateway_retry(|| self.gateway.create_intent(booking.id, quote.total))
            .await
        {
            Ok(intent) => intent,
            Err(err) => {
                self.compensate_create(booking.id).await;
                return Err(err);
            }
        };

        if let Err(err) = self.store.attach_intent(booking.id, &intent.reference).await {
            self.compensate_create(booking.id).await;
            return Err(err.into());
        }

        tracing::info!(booking_id = %booking.id, intent_ref = %intent.reference, "booking created");

        let booking = self
            .store
            .get_booking(booking.id)
            .await?
            .ok_or(EngineError::BookingNotFound(booking.id))?;

        Ok(CreatedBooking {
            booking,
            client_secret: intent.client_secret,
        })
    }

    /// Loads a booking.
    pub async fn get(&self, booking_id: BookingId) -> Result<Booking> {
        self.store
            .get_booking(booking_id)
            .await?
            .ok_or(EngineError::BookingNotFound(booking_id))
    }

    /// Cancels a booking, refunding first when the payment has settled.
    ///
    /// The refund is requested before the cancellation is written, so a
    /// gateway failure leaves the booking untouched rather than cancelled
    /// but unrefunded. If the payment settles between the read and the
    /// write, the conditional cancel reports the conflict and the whole
    /// decision is re-driven against the fresh state.
    #[tracing::instrument(skip(self, reason))]
    pub async fn cancel(&self, booking_id: BookingId, reason: Option<&str>) -> Result<Booking> {
        metrics::counter!("bookings_cancel_total").increment(1);

        for _ in 0..CANCEL_ATTEMPTS {
            let booking = self.get(booking_id).await?;

            if booking.status.is_terminal() {
                return Ok(booking);
            }

            let refunding = booking.payment_status.needs_refund();
            if refunding {
                let intent_ref = booking.intent_ref.clone().ok_or_else(|| {
                    EngineError::InvalidRequest(
                        "paid booking has no payment intent reference".to_string(),
                    )
                })?;
                self.with_gateway_retry(|| self.gateway.refund(&intent_ref, booking.quote.total))
                    .await?;
                metrics::counter!("bookings_refund_total").increment(1);
            }

            match self
                .store
                .cancel_booking(booking_id, booking.payment_status, refunding)
                .await
            {
                Ok(CancelOutcome::Cancelled(cancelled)) => {
                    tracing::info!(
                        %booking_id,
                        refunded = refunding,
                        reason = reason.unwrap_or("unspecified"),
                        "booking cancelled"
                    );
                    return Ok(cancelled);
                }
                Ok(CancelOutcome::AlreadyCancelled(cancelled)) => return Ok(cancelled),
                // Payment state moved underneath us (settlement raced the
                // cancel); re-read and decide again.
                Err(StoreError::StateConflict { .. }) => continue,
                Err(err) => return Err(err.into()),
            }
        }

        Err(EngineError::InvalidRequest(
            "booking state kept changing during cancellation".to_string(),
        ))
    }

    async fn compensate_create(&self, booking_id: BookingId) {
        use domain::PaymentStatus;

        if let Err(err) = self
            .store
            .cancel_booking(booking_id, PaymentStatus::Pending, false)
            .await
        {
            tracing::error!(%booking_id, error = %err, "failed to compensate booking creation");
        }
    }
}
