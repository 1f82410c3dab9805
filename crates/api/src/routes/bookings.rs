//! Booking lifecycle and validation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use booking_store::BookingStore;
use chrono::{NaiveDate, NaiveTime};
use common::BookingId;
use domain::{Booking, CourseId, Decision, GolferId, ProId, ValidationRecord};
use engine::{BookingService, InMemoryPaymentGateway, NewBooking, ValidationWorkflow, WebhookReconciler};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: BookingStore> {
    pub bookings: BookingService<S, InMemoryPaymentGateway>,
    pub validations: ValidationWorkflow<S>,
    pub reconciler: WebhookReconciler<S>,
    pub store: Arc<S>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub golfer_id: Option<String>,
    pub pro_id: String,
    pub course_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub players: u8,
    pub holes: u8,
}

#[derive(Deserialize, Default)]
pub struct CancelRequest {
    pub reason: Option<String>,
    pub cancelled_by: Option<String>,
}

#[derive(Deserialize)]
pub struct DecisionRequest {
    pub reviewer_id: String,
    pub decision: Decision,
    pub notes: Option<String>,
}

// -- Response types --

/// Body of a successful creation: the booking plus the one-time secret
/// the golfer's client needs to complete the payment.
#[derive(Serialize)]
pub struct CreateBookingResponse {
    pub booking_id: String,
    pub client_payment_secret: String,
    pub booking: BookingResponse,
}

#[derive(Serialize)]
pub struct BookingResponse {
    pub id: String,
    pub golfer_id: String,
    pub pro_id: String,
    pub slot_id: String,
    pub players: u8,
    pub holes: u8,
    pub pro_fee_cents: i64,
    pub platform_fee_cents: i64,
    pub total_cents: i64,
    pub commission_bps: u32,
    pub intent_ref: Option<String>,
    pub payment_status: String,
    pub status: String,
    pub validation_status: String,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            id: booking.id.to_string(),
            golfer_id: booking.golfer_id.to_string(),
            pro_id: booking.pro_id.to_string(),
            slot_id: booking.slot_id.to_string(),
            players: booking.players.get(),
            holes: booking.holes.as_u8(),
            pro_fee_cents: booking.quote.pro_fee.cents(),
            platform_fee_cents: booking.quote.platform_fee.cents(),
            total_cents: booking.quote.total.cents(),
            commission_bps: booking.quote.commission_rate.basis_points(),
            intent_ref: booking.intent_ref.map(|i| i.to_string()),
            payment_status: booking.payment_status.to_string(),
            status: booking.status.to_string(),
            validation_status: booking.validation_status.to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct ValidationResponse {
    pub booking_id: String,
    pub reviewer_id: Option<String>,
    pub decision: Option<Decision>,
    pub notes: Option<String>,
    pub decided: bool,
}

impl From<ValidationRecord> for ValidationResponse {
    fn from(record: ValidationRecord) -> Self {
        Self {
            booking_id: record.booking_id.to_string(),
            reviewer_id: record.reviewer_id.map(|id| id.to_string()),
            decision: record.decision,
            notes: record.notes.clone(),
            decided: record.is_decided(),
        }
    }
}

fn parse_booking_id(raw: &str) -> Result<BookingId, ApiError> {
    uuid::Uuid::parse_str(raw)
        .map(BookingId::from_uuid)
        .map_err(|e| ApiError::BadRequest(format!("Invalid booking id: {e}")))
}

// -- Handlers --

/// POST /bookings — reserve capacity and open a payment intent.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: BookingStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(axum::http::StatusCode, Json<CreateBookingResponse>), ApiError> {
    let golfer_id = if let Some(ref id_str) = req.golfer_id {
        let uuid = uuid::Uuid::parse_str(id_str)
            .map_err(|e| ApiError::BadRequest(format!("Invalid golfer_id: {e}")))?;
        GolferId::from_uuid(uuid)
    } else {
        GolferId::new()
    };
    let pro_id = uuid::Uuid::parse_str(&req.pro_id)
        .map(ProId::from_uuid)
        .map_err(|e| ApiError::BadRequest(format!("Invalid pro_id: {e}")))?;

    let created = state
        .bookings
        .create(NewBooking {
            golfer_id,
            pro_id,
            course_id: CourseId::new(req.course_id),
            date: req.date,
            start_time: req.start_time,
            players: req.players,
            holes: req.holes,
        })
        .await?;

    let response = CreateBookingResponse {
        booking_id: created.booking.id.to_string(),
        client_payment_secret: created.client_secret,
        booking: created.booking.into(),
    };
    Ok((axum::http::StatusCode::CREATED, Json(response)))
}

/// GET /bookings/{id} — fetch a booking.
#[tracing::instrument(skip(state))]
pub async fn get<S: BookingStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking_id = parse_booking_id(&id)?;
    let booking = state.bookings.get(booking_id).await?;
    Ok(Json(booking.into()))
}

/// POST /bookings/{id}/cancel — cancel, refunding first if paid. The
/// body is optional; when present it carries the audit reason.
#[tracing::instrument(skip(state, req))]
pub async fn cancel<S: BookingStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    req: Option<Json<CancelRequest>>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking_id = parse_booking_id(&id)?;
    let req = req.map(|Json(r)| r).unwrap_or_default();
    if let Some(ref by) = req.cancelled_by {
        tracing::info!(%booking_id, cancelled_by = %by, "operator cancellation");
    }
    let booking = state
        .bookings
        .cancel(booking_id, req.reason.as_deref())
        .await?;
    Ok(Json(booking.into()))
}

/// POST /bookings/{id}/decision — record an admin decision.
#[tracing::instrument(skip(state, req))]
pub async fn decide<S: BookingStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<ValidationResponse>, ApiError> {
    let booking_id = parse_booking_id(&id)?;
    let reviewer_id = uuid::Uuid::parse_str(&req.reviewer_id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid reviewer_id: {e}")))?;

    let record = state
        .validations
        .decide(booking_id, reviewer_id, req.decision, req.notes)
        .await?;
    Ok(Json(record.into()))
}

/// GET /bookings/{id}/validation — fetch the validation record.
#[tracing::instrument(skip(state))]
pub async fn validation<S: BookingStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ValidationResponse>, ApiError> {
    let booking_id = parse_booking_id(&id)?;
    let record = state.validations.get(booking_id).await?;
    Ok(Json(record.into()))
}
