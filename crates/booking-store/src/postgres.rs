use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BookingId, EventId, SlotId};
use domain::{
    Booking, CommissionRate, CourseId, Decision, GolferId, Holes, IntentRef, Money, PaymentEvent,
    PaymentOutcome, PaymentStatus, PlayerCount, ProId, Quote, Slot, SlotKey, ValidationRecord,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{BookingStore, CancelOutcome, DeadLetter, DecisionOutcome, SettleOutcome},
};

/// PostgreSQL-backed booking store.
///
/// Conditional operations are expressed as `UPDATE ... WHERE <precondition>
/// RETURNING`, so the row-level lock taken by the update is what arbitrates
/// concurrent replicas. No operation reads state and then writes it back.
#[derive(Clone)]
pub struct PostgresBookingStore {
    pool: PgPool,
}

const BOOKING_COLUMNS: &str = "id, golfer_id, pro_id, slot_id, players, holes, \
     pro_fee_cents, platform_fee_cents, total_cents, commission_bps, \
     intent_ref, payment_status, status, validation_status, created_at, confirmed_at";

const SLOT_COLUMNS: &str =
    "id, pro_id, course_id, date, start_time, max_players, current_bookings";

impl PostgresBookingStore {
    /// Creates a new PostgreSQL booking store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database and wraps the pool in a store.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_slot(row: PgRow) -> Result<Slot> {
        Ok(Slot {
            id: SlotId::from_uuid(row.try_get::<Uuid, _>("id")?),
            key: SlotKey {
                pro_id: ProId::from_uuid(row.try_get::<Uuid, _>("pro_id")?),
                course_id: CourseId::new(row.try_get::<String, _>("course_id")?),
                date: row.try_get("date")?,
                start_time: row.try_get("start_time")?,
            },
            max_players: row.try_get::<i32, _>("max_players")? as u32,
            current_bookings: row.try_get::<i32, _>("current_bookings")? as u32,
        })
    }

    fn row_to_booking(row: PgRow) -> Result<Booking> {
        let players = PlayerCount::try_new(row.try_get::<i32, _>("players")? as u8)
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        let holes = Holes::try_from_u8(row.try_get::<i32, _>("holes")? as u8)
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        let quote = Quote {
            pro_fee: Money::from_cents(row.try_get("pro_fee_cents")?),
            platform_fee: Money::from_cents(row.try_get("platform_fee_cents")?),
            total: Money::from_cents(row.try_get("total_cents")?),
            commission_rate: CommissionRate::from_basis_points(
                row.try_get::<i32, _>("commission_bps")? as u32,
            ),
        };

        Ok(Booking {
            id: BookingId::from_uuid(row.try_get::<Uuid, _>("id")?),
            golfer_id: GolferId::from_uuid(row.try_get::<Uuid, _>("golfer_id")?),
            pro_id: ProId::from_uuid(row.try_get::<Uuid, _>("pro_id")?),
            slot_id: SlotId::from_uuid(row.try_get::<Uuid, _>("slot_id")?),
            players,
            holes,
            quote,
            intent_ref: row
                .try_get::<Option<String>, _>("intent_ref")?
                .map(IntentRef::new),
            payment_status: parse_payment_status(&row.try_get::<String, _>("payment_status")?)?,
            status: parse_booking_status(&row.try_get::<String, _>("status")?)?,
            validation_status: parse_validation_status(
                &row.try_get::<String, _>("validation_status")?,
            )?,
            created_at: row.try_get("created_at")?,
            confirmed_at: row.try_get("confirmed_at")?,
        })
    }

    fn row_to_validation(row: PgRow) -> Result<ValidationRecord> {
        Ok(ValidationRecord {
            booking_id: BookingId::from_uuid(row.try_get::<Uuid, _>("booking_id")?),
            reviewer_id: row.try_get("reviewer_id")?,
            decision: row
                .try_get::<Option<String>, _>("decision")?
                .map(|s| parse_decision(&s))
                .transpose()?,
            notes: row.try_get("notes")?,
            opened_at: row.try_get("opened_at")?,
            decided_at: row.try_get("decided_at")?,
        })
    }

    fn row_to_event(row: PgRow) -> Result<PaymentEvent> {
        Ok(PaymentEvent {
            event_id: EventId::new(row.try_get::<String, _>("event_id")?),
            intent_ref: IntentRef::new(row.try_get::<String, _>("intent_ref")?),
            outcome: parse_outcome(&row.try_get::<String, _>("outcome")?)?,
            payload: row.try_get("payload")?,
            received_at: row.try_get("received_at")?,
        })
    }

    async fn fetch_booking_by_intent(&self, intent_ref: &IntentRef) -> Result<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE intent_ref = $1");
        let row = sqlx::query(&sql)
            .bind(intent_ref.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_booking).transpose()
    }
}

fn parse_booking_status(s: &str) -> Result<domain::BookingStatus> {
    match s {
        "Pending" => Ok(domain::BookingStatus::Pending),
        "Confirmed" => Ok(domain::BookingStatus::Confirmed),
        "Cancelled" => Ok(domain::BookingStatus::Cancelled),
        other => Err(StoreError::Decode(format!("unknown booking status: {other}"))),
    }
}

fn parse_payment_status(s: &str) -> Result<PaymentStatus> {
    match s {
        "Pending" => Ok(PaymentStatus::Pending),
        "Paid" => Ok(PaymentStatus::Paid),
        "Failed" => Ok(PaymentStatus::Failed),
        "Refunded" => Ok(PaymentStatus::Refunded),
        other => Err(StoreError::Decode(format!("unknown payment status: {other}"))),
    }
}

fn parse_validation_status(s: &str) -> Result<domain::ValidationStatus> {
    match s {
        "Pending" => Ok(domain::ValidationStatus::Pending),
        "Approved" => Ok(domain::ValidationStatus::Approved),
        "Rejected" => Ok(domain::ValidationStatus::Rejected),
        other => Err(StoreError::Decode(format!(
            "unknown validation status: {other}"
        ))),
    }
}

fn parse_decision(s: &str) -> Result<Decision> {
    match s {
        "approve" => Ok(Decision::Approve),
        "reject" => Ok(Decision::Reject),
        other => Err(StoreError::Decode(format!("unknown decision: {other}"))),
    }
}

fn decision_as_str(decision: Decision) -> &'static str {
    match decision {
        Decision::Approve => "approve",
        Decision::Reject => "reject",
    }
}

fn parse_outcome(s: &str) -> Result<PaymentOutcome> {
    match s {
        "succeeded" => Ok(PaymentOutcome::Succeeded),
        "failed" => Ok(PaymentOutcome::Failed),
        other => Err(StoreError::Decode(format!("unknown outcome: {other}"))),
    }
}

#[async_trait]
impl BookingStore for PostgresBookingStore {
    async fn reserve_slot(&self, key: &SlotKey, max_players: u32) -> Result<Slot> {
        let mut tx = self.pool.begin().await?;

        // Lazy get-or-create; the unique key makes this idempotent under
        // concurrent first bookings.
        sqlx::query(
            r#"
            INSERT INTO slots (id, pro_id, course_id, date, start_time, max_players)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT ON CONSTRAINT unique_slot_key DO NOTHING
            "#,
        )
        .bind(SlotId::new().as_uuid())
        .bind(key.pro_id.as_uuid())
        .bind(key.course_id.as_str())
        .bind(key.date)
        .bind(key.start_time)
        .bind(max_players as i32)
        .execute(&mut *tx)
        .await?;

        let sql = format!(
            "UPDATE slots SET current_bookings = current_bookings + 1 \
             WHERE pro_id = $1 AND course_id = $2 AND date = $3 AND start_time = $4 \
               AND current_bookings < max_players \
             RETURNING {SLOT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(key.pro_id.as_uuid())
            .bind(key.course_id.as_str())
            .bind(key.date)
            .bind(key.start_time)
            .fetch_optional(&mut *tx)
            .await?;

        match row {
            Some(row) => {
                let slot = Self::row_to_slot(row)?;
                tx.commit().await?;
                Ok(slot)
            }
            None => {
                // The slot exists (inserted above if nothing raced us), so
                // the update could only have been rejected by capacity.
                let slot_id: Uuid = sqlx::query_scalar(
                    "SELECT id FROM slots \
                     WHERE pro_id = $1 AND course_id = $2 AND date = $3 AND start_time = $4",
                )
                .bind(key.pro_id.as_uuid())
                .bind(key.course_id.as_str())
                .bind(key.date)
                .bind(key.start_time)
                .fetch_one(&mut *tx)
                .await?;

                Err(StoreError::CapacityExceeded {
                    slot_id: SlotId::from_uuid(slot_id),
                })
            }
        }
    }

    async fn release_slot(&self, slot_id: SlotId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE slots SET current_bookings = GREATEST(current_bookings - 1, 0) WHERE id = $1",
        )
        .bind(slot_id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::SlotNotFound(slot_id));
        }
        Ok(())
    }

    async fn find_slot(&self, key: &SlotKey) -> Result<Option<Slot>> {
        let sql = format!(
            "SELECT {SLOT_COLUMNS} FROM slots \
             WHERE pro_id = $1 AND course_id = $2 AND date = $3 AND start_time = $4"
        );
        let row = sqlx::query(&sql)
            .bind(key.pro_id.as_uuid())
            .bind(key.course_id.as_str())
            .bind(key.date)
            .bind(key.start_time)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_slot).transpose()
    }

    async fn get_slot(&self, slot_id: SlotId) -> Result<Option<Slot>> {
        let sql = format!("SELECT {SLOT_COLUMNS} FROM slots WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(slot_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_slot).transpose()
    }

    async fn insert_booking(&self, booking: &Booking) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, golfer_id, pro_id, slot_id, players, holes,
                pro_fee_cents, platform_fee_cents, total_cents, commission_bps,
                intent_ref, payment_status, status, validation_status,
                created_at, confirmed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(booking.id.as_uuid())
        .bind(booking.golfer_id.as_uuid())
        .bind(booking.pro_id.as_uuid())
        .bind(booking.slot_id.as_uuid())
        .bind(i32::from(booking.players.get()))
        .bind(i32::from(booking.holes.as_u8()))
        .bind(booking.quote.pro_fee.cents())
        .bind(booking.quote.platform_fee.cents())
        .bind(booking.quote.total.cents())
        .bind(booking.quote.commission_rate.basis_points() as i32)
        .bind(booking.intent_ref.as_ref().map(|i| i.as_str()))
        .bind(booking.payment_status.as_str())
        .bind(booking.status.as_str())
        .bind(booking.validation_status.as_str())
        .bind(booking.created_at)
        .bind(booking.confirmed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_intent_ref")
                && let Some(intent) = &booking.intent_ref
            {
                return StoreError::DuplicateIntent(intent.to_string());
            }
            StoreError::Database(e)
        })?;
        Ok(())
    }

    async fn attach_intent(&self, booking_id: BookingId, intent_ref: &IntentRef) -> Result<()> {
        let result = sqlx::query(
            "UPDATE bookings SET intent_ref = $2 WHERE id = $1 AND intent_ref IS NULL",
        )
        .bind(booking_id.as_uuid())
        .bind(intent_ref.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_intent_ref")
            {
                return StoreError::DuplicateIntent(intent_ref.to_string());
            }
            StoreError::Database(e)
        })?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.get_booking(booking_id).await? {
            None => Err(StoreError::BookingNotFound(booking_id)),
            Some(booking) => Err(StoreError::DuplicateIntent(
                booking
                    .intent_ref
                    .map(|i| i.to_string())
                    .unwrap_or_else(|| intent_ref.to_string()),
            )),
        }
    }

    async fn get_booking(&self, booking_id: BookingId) -> Result<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(booking_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_booking).transpose()
    }

    async fn find_booking_by_intent(&self, intent_ref: &IntentRef) -> Result<Option<Booking>> {
        self.fetch_booking_by_intent(intent_ref).await
    }

    async fn settle_payment(
        &self,
        intent_ref: &IntentRef,
        at: DateTime<Utc>,
    ) -> Result<SettleOutcome> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE bookings \
             SET payment_status = 'Paid', status = 'Confirmed', confirmed_at = $2 \
             WHERE intent_ref = $1 \
               AND payment_status IN ('Pending', 'Failed') \
               AND status = 'Pending' \
             RETURNING {BOOKING_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(intent_ref.as_str())
            .bind(at)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(row) = row {
            let booking = Self::row_to_booking(row)?;

            // Open the validation gate in the same transaction.
            sqlx::query(
                "INSERT INTO validation_records (booking_id, opened_at) VALUES ($1, $2) \
                 ON CONFLICT (booking_id) DO NOTHING",
            )
            .bind(booking.id.as_uuid())
            .bind(at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            return Ok(SettleOutcome::Settled(booking));
        }
        drop(tx);

        match self.fetch_booking_by_intent(intent_ref).await? {
            None => Err(StoreError::IntentNotFound(intent_ref.to_string())),
            Some(booking) if booking.payment_status == PaymentStatus::Paid => {
                Ok(SettleOutcome::AlreadyPaid(booking))
            }
            Some(booking) => Ok(SettleOutcome::Superseded(booking)),
        }
    }

    async fn fail_payment(&self, intent_ref: &IntentRef) -> Result<Booking> {
        let sql = format!(
            "UPDATE bookings SET payment_status = 'Failed' \
             WHERE intent_ref = $1 AND payment_status IN ('Pending', 'Failed') \
             RETURNING {BOOKING_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(intent_ref.as_str())
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            return Self::row_to_booking(row);
        }

        // Already settled or refunded: the failure event is a no-op.
        self.fetch_booking_by_intent(intent_ref)
            .await?
            .ok_or_else(|| StoreError::IntentNotFound(intent_ref.to_string()))
    }

    async fn cancel_booking(
        &self,
        booking_id: BookingId,
        expected_payment: PaymentStatus,
        refunded: bool,
    ) -> Result<CancelOutcome> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE bookings \
             SET status = 'Cancelled', \
                 payment_status = CASE WHEN $3 THEN 'Refunded' ELSE payment_status END \
             WHERE id = $1 AND status != 'Cancelled' AND payment_status = $2 \
             RETURNING {BOOKING_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(booking_id.as_uuid())
            .bind(expected_payment.as_str())
            .bind(refunded)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(row) = row {
            let booking = Self::row_to_booking(row)?;

            sqlx::query(
                "UPDATE slots SET current_bookings = GREATEST(current_bookings - 1, 0) \
                 WHERE id = $1",
            )
            .bind(booking.slot_id.as_uuid())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            return Ok(CancelOutcome::Cancelled(booking));
        }
        drop(tx);

        match self.get_booking(booking_id).await? {
            None => Err(StoreError::BookingNotFound(booking_id)),
            Some(booking) if booking.status.is_terminal() => {
                Ok(CancelOutcome::AlreadyCancelled(booking))
            }
            Some(booking) => Err(StoreError::StateConflict {
                booking_id,
                expected: expected_payment,
                actual: booking.payment_status,
            }),
        }
    }

    async fn expire_pending_bookings(&self, cutoff: DateTime<Utc>) -> Result<Vec<Booking>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE bookings SET status = 'Cancelled' \
             WHERE status = 'Pending' AND payment_status = 'Pending' AND created_at < $1 \
             RETURNING {BOOKING_COLUMNS}"
        );
        let rows = sqlx::query(&sql).bind(cutoff).fetch_all(&mut *tx).await?;

        let mut expired = Vec::with_capacity(rows.len());
        for row in rows {
            let booking = Self::row_to_booking(row)?;
            sqlx::query(
                "UPDATE slots SET current_bookings = GREATEST(current_bookings - 1, 0) \
                 WHERE id = $1",
            )
            .bind(booking.slot_id.as_uuid())
            .execute(&mut *tx)
            .await?;
            expired.push(booking);
        }

        tx.commit().await?;
        Ok(expired)
    }

    async fn record_decision(
        &self,
        booking_id: BookingId,
        reviewer_id: Uuid,
        decision: Decision,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<DecisionOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "UPDATE validation_records \
             SET reviewer_id = $2, decision = $3, notes = $4, decided_at = $5 \
             WHERE booking_id = $1 AND decision IS NULL \
             RETURNING booking_id, reviewer_id, decision, notes, opened_at, decided_at",
        )
        .bind(booking_id.as_uuid())
        .bind(reviewer_id)
        .bind(decision_as_str(decision))
        .bind(&notes)
        .bind(at)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = row {
            let record = Self::row_to_validation(row)?;

            sqlx::query("UPDATE bookings SET validation_status = $2 WHERE id = $1")
                .bind(booking_id.as_uuid())
                .bind(decision.resulting_status().as_str())
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            return Ok(DecisionOutcome::Recorded(record));
        }
        drop(tx);

        if let Some(record) = self.get_validation(booking_id).await? {
            return Ok(DecisionOutcome::AlreadyDecided(record));
        }

        match self.get_booking(booking_id).await? {
            None => Err(StoreError::BookingNotFound(booking_id)),
            Some(_) => Ok(DecisionOutcome::NotPaid),
        }
    }

    async fn get_validation(&self, booking_id: BookingId) -> Result<Option<ValidationRecord>> {
        let row = sqlx::query(
            "SELECT booking_id, reviewer_id, decision, notes, opened_at, decided_at \
             FROM validation_records WHERE booking_id = $1",
        )
        .bind(booking_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_validation).transpose()
    }

    async fn insert_payment_event(&self, event: &PaymentEvent) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_events (event_id, intent_ref, outcome, payload, received_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event.event_id.as_str())
        .bind(event.intent_ref.as_str())
        .bind(event.outcome.to_string())
        .bind(&event.payload)
        .bind(event.received_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_payment_event(&self, event_id: &EventId) -> Result<Option<PaymentEvent>> {
        let row = sqlx::query(
            "SELECT event_id, intent_ref, outcome, payload, received_at \
             FROM payment_events WHERE event_id = $1",
        )
        .bind(event_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_event).transpose()
    }

    async fn push_dead_letter(&self, event: &PaymentEvent, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dead_letters (event_id, intent_ref, outcome, payload, received_at, reason, parked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.event_id.as_str())
        .bind(event.intent_ref.as_str())
        .bind(event.outcome.to_string())
        .bind(&event.payload)
        .bind(event.received_at)
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let rows = sqlx::query(
            "SELECT event_id, intent_ref, outcome, payload, received_at, reason, parked_at \
             FROM dead_letters ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let parked_at = row.try_get("parked_at")?;
                let reason = row.try_get("reason")?;
                let event = Self::row_to_event(row)?;
                Ok(DeadLetter {
                    event,
                    reason,
                    parked_at,
                })
            })
            .collect()
    }
}
