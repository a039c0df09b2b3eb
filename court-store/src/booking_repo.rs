use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use court_core::models::{
    Court, CourtUpdate, Customer, MaintenanceWindow, Payment, PaymentPatch, PaymentStatus,
    PriceBreakdown, PromoCode, Reservation, ReservationStatus, Ticket, TicketStatus,
};
use court_core::{BookingStore, CoreError, StoreError, StoreResult};
use court_shared::Masked;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Pool, Postgres, Row};
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";
const EXCLUSION_VIOLATION: &str = "23P01";

/// Postgres-backed [`BookingStore`].
///
/// Hold inserts run in a transaction holding an advisory lock keyed by court and venue-local
/// date, so overlapping inserts are linearized. The `reservations_no_overlap` exclusion
/// constraint rejects anything that gets past the lock.
#[derive(Clone)]
pub struct PgBookingStore {
    pool: Pool<Postgres>,
    venue_offset: FixedOffset,
}

impl PgBookingStore {
    pub fn new(pool: Pool<Postgres>, venue_offset: FixedOffset) -> Self {
        Self { pool, venue_offset }
    }

    fn lock_key(&self, reservation: &Reservation) -> String {
        let date = reservation
            .start_time
            .with_timezone(&self.venue_offset)
            .date_naive();
        format!("reservation:{}:{}", reservation.court_id, date)
    }
}

fn map_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if matches!(db.code().as_deref(), Some(UNIQUE_VIOLATION) | Some(EXCLUSION_VIOLATION)) {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    StoreError::backend(err)
}

fn decode_err(err: CoreError) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}

fn names<T: ToString>(statuses: &[T]) -> Vec<String> {
    statuses.iter().map(ToString::to_string).collect()
}

#[derive(FromRow)]
struct CourtRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    is_active: bool,
    is_indoor: bool,
    hourly_rate_peak: Decimal,
    hourly_rate_offpeak: Decimal,
    created_at: DateTime<Utc>,
}

impl From<CourtRow> for Court {
    fn from(row: CourtRow) -> Self {
        Court {
            id: row.id,
            name: row.name,
            description: row.description,
            is_active: row.is_active,
            is_indoor: row.is_indoor,
            hourly_rate_peak: row.hourly_rate_peak,
            hourly_rate_offpeak: row.hourly_rate_offpeak,
            created_at: row.created_at,
        }
    }
}

struct CustomerRow(Customer);

impl<'r> FromRow<'r, PgRow> for CustomerRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        let phone: Option<String> = row.try_get("phone")?;
        Ok(CustomerRow(Customer {
            id: row.try_get("id")?,
            display_name: row.try_get("display_name")?,
            phone: phone.map(Masked),
            is_vip: row.try_get("is_vip")?,
            is_blocked: row.try_get("is_blocked")?,
            role: role.parse().map_err(decode_err)?,
        }))
    }
}

struct ReservationRow(Reservation);

impl<'r> FromRow<'r, PgRow> for ReservationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(ReservationRow(Reservation {
            id: row.try_get("id")?,
            court_id: row.try_get("court_id")?,
            customer_id: row.try_get("customer_id")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            status: status.parse().map_err(decode_err)?,
            pricing: PriceBreakdown {
                base_price: row.try_get("base_price")?,
                peak_extra: row.try_get("peak_extra")?,
                weekend_extra: row.try_get("weekend_extra")?,
                subtotal: row.try_get("subtotal")?,
                discount: row.try_get("discount")?,
                service_fee: row.try_get("service_fee")?,
                final_amount: row.try_get("final_amount")?,
                is_peak: row.try_get("is_peak")?,
                is_weekend: row.try_get("is_weekend")?,
            },
            promo_code: row.try_get("promo_code")?,
            hold_expires_at: row.try_get("hold_expires_at")?,
            cancellation_reason: row.try_get("cancellation_reason")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

struct PaymentRow(Payment);

impl<'r> FromRow<'r, PgRow> for PaymentRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let method: String = row.try_get("method")?;
        let status: String = row.try_get("status")?;
        Ok(PaymentRow(Payment {
            id: row.try_get("id")?,
            reservation_id: row.try_get("reservation_id")?,
            customer_id: row.try_get("customer_id")?,
            method: method.parse().map_err(decode_err)?,
            amount: row.try_get("amount")?,
            status: status.parse().map_err(decode_err)?,
            external_ref: row.try_get("external_ref")?,
            payment_url: row.try_get("payment_url")?,
            refunded_amount: row.try_get("refunded_amount")?,
            error_message: row.try_get("error_message")?,
            poll_attempts: row.try_get("poll_attempts")?,
            paid_at: row.try_get("paid_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

struct TicketRow(Ticket);

impl<'r> FromRow<'r, PgRow> for TicketRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(TicketRow(Ticket {
            id: row.try_get("id")?,
            reservation_id: row.try_get("reservation_id")?,
            credential: row.try_get("credential")?,
            payload: row.try_get("payload")?,
            status: status.parse().map_err(decode_err)?,
            used_at: row.try_get("used_at")?,
            redeemed_by: row.try_get("redeemed_by")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

struct PromoRow(PromoCode);

impl<'r> FromRow<'r, PgRow> for PromoRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("kind")?;
        Ok(PromoRow(PromoCode {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            kind: kind.parse().map_err(decode_err)?,
            value: row.try_get("value")?,
            max_uses: row.try_get("max_uses")?,
            used_count: row.try_get("used_count")?,
            is_active: row.try_get("is_active")?,
            valid_from: row.try_get("valid_from")?,
            valid_until: row.try_get("valid_until")?,
        }))
    }
}

#[derive(FromRow)]
struct MaintenanceRow {
    id: Uuid,
    court_id: Uuid,
    title: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

impl From<MaintenanceRow> for MaintenanceWindow {
    fn from(row: MaintenanceRow) -> Self {
        MaintenanceWindow {
            id: row.id,
            court_id: row.court_id,
            title: row.title,
            start_time: row.start_time,
            end_time: row.end_time,
        }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn get_court(&self, id: Uuid) -> StoreResult<Option<Court>> {
        let row = sqlx::query_as::<_, CourtRow>("SELECT * FROM courts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(row.map(Court::from))
    }

    async fn list_courts(&self) -> StoreResult<Vec<Court>> {
        let rows = sqlx::query_as::<_, CourtRow>("SELECT * FROM courts ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(rows.into_iter().map(Court::from).collect())
    }

    async fn save_court(&self, court: &Court) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO courts (id, name, description, is_active, is_indoor, hourly_rate_peak, hourly_rate_offpeak, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                is_active = EXCLUDED.is_active,
                is_indoor = EXCLUDED.is_indoor,
                hourly_rate_peak = EXCLUDED.hourly_rate_peak,
                hourly_rate_offpeak = EXCLUDED.hourly_rate_offpeak
            "#,
        )
        .bind(court.id)
        .bind(&court.name)
        .bind(&court.description)
        .bind(court.is_active)
        .bind(court.is_indoor)
        .bind(court.hourly_rate_peak)
        .bind(court.hourly_rate_offpeak)
        .bind(court.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn update_court(&self, id: Uuid, update: &CourtUpdate) -> StoreResult<Option<Court>> {
        let row = sqlx::query_as::<_, CourtRow>(
            r#"
            UPDATE courts SET
                is_active = COALESCE($2, is_active),
                hourly_rate_peak = COALESCE($3, hourly_rate_peak),
                hourly_rate_offpeak = COALESCE($4, hourly_rate_offpeak)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update.is_active)
        .bind(update.hourly_rate_peak)
        .bind(update.hourly_rate_offpeak)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(row.map(Court::from))
    }

    async fn get_customer(&self, id: &str) -> StoreResult<Option<Customer>> {
        let row = sqlx::query_as::<_, CustomerRow>("SELECT * FROM customers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(row.map(|r| r.0))
    }

    async fn save_customer(&self, customer: &Customer) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, display_name, phone, is_vip, is_blocked, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                phone = EXCLUDED.phone,
                is_vip = EXCLUDED.is_vip,
                is_blocked = EXCLUDED.is_blocked,
                role = EXCLUDED.role
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.display_name)
        .bind(customer.phone.as_ref().map(|p| p.expose().clone()))
        .bind(customer.is_vip)
        .bind(customer.is_blocked)
        .bind(customer.role.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn insert_hold(&self, reservation: &Reservation) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(self.lock_key(reservation))
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

        let (taken,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM reservations
                WHERE court_id = $1
                  AND status IN ('HOLD', 'PAID', 'CONFIRMED')
                  AND start_time < $3 AND $2 < end_time
            ) OR EXISTS (
                SELECT 1 FROM maintenance_windows
                WHERE court_id = $1 AND start_time < $3 AND $2 < end_time
            )
            "#,
        )
        .bind(reservation.court_id)
        .bind(reservation.start_time)
        .bind(reservation.end_time)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_err)?;

        if taken {
            return Err(StoreError::Conflict(format!(
                "court {} is not free at {}",
                reservation.court_id, reservation.start_time
            )));
        }

        let p = &reservation.pricing;
        sqlx::query(
            r#"
            INSERT INTO reservations (
                id, court_id, customer_id, start_time, end_time, status,
                base_price, peak_extra, weekend_extra, subtotal, discount, service_fee, final_amount,
                is_peak, is_weekend, promo_code, hold_expires_at, cancellation_reason, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.court_id)
        .bind(&reservation.customer_id)
        .bind(reservation.start_time)
        .bind(reservation.end_time)
        .bind(reservation.status.as_str())
        .bind(p.base_price)
        .bind(p.peak_extra)
        .bind(p.weekend_extra)
        .bind(p.subtotal)
        .bind(p.discount)
        .bind(p.service_fee)
        .bind(p.final_amount)
        .bind(p.is_peak)
        .bind(p.is_weekend)
        .bind(&reservation.promo_code)
        .bind(reservation.hold_expires_at)
        .bind(&reservation.cancellation_reason)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        tx.commit().await.map_err(map_err)?;
        Ok(())
    }

    async fn get_reservation(&self, id: Uuid) -> StoreResult<Option<Reservation>> {
        let row = sqlx::query_as::<_, ReservationRow>("SELECT * FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(row.map(|r| r.0))
    }

    async fn list_active_reservations(
        &self,
        court_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT * FROM reservations
            WHERE court_id = $1
              AND status IN ('HOLD', 'PAID', 'CONFIRMED')
              AND start_time < $3 AND $2 < end_time
            ORDER BY start_time
            "#,
        )
        .bind(court_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn list_customer_reservations(&self, customer_id: &str) -> StoreResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(
            "SELECT * FROM reservations WHERE customer_id = $1 ORDER BY start_time DESC",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn list_reservations_with_status(
        &self,
        status: ReservationStatus,
        ended_by: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT * FROM reservations
            WHERE status = $1 AND ($2::timestamptz IS NULL OR end_time <= $2)
            ORDER BY start_time
            "#,
        )
        .bind(status.as_str())
        .bind(ended_by)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn transition_reservation(
        &self,
        id: Uuid,
        from: &[ReservationStatus],
        to: ReservationStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Reservation>> {
        let row = sqlx::query_as::<_, ReservationRow>(
            r#"
            UPDATE reservations SET
                status = $3,
                hold_expires_at = CASE WHEN $3 = 'HOLD' THEN hold_expires_at ELSE NULL END,
                cancellation_reason = COALESCE($4, cancellation_reason),
                updated_at = $5
            WHERE id = $1 AND status = ANY($2)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(names(from))
        .bind(to.as_str())
        .bind(reason)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(row.map(|r| r.0))
    }

    async fn cancel_expired_holds(&self, now: DateTime<Utc>) -> StoreResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(
            r#"
            UPDATE reservations SET
                status = 'CANCELLED',
                hold_expires_at = NULL,
                cancellation_reason = 'hold expired',
                updated_at = $1
            WHERE status = 'HOLD' AND hold_expires_at <= $1
            RETURNING *
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn insert_payment(&self, payment: &Payment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, reservation_id, customer_id, method, amount, status, external_ref, payment_url,
                refunded_amount, error_message, poll_attempts, paid_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(payment.id)
        .bind(payment.reservation_id)
        .bind(&payment.customer_id)
        .bind(payment.method.as_str())
        .bind(payment.amount)
        .bind(payment.status.as_str())
        .bind(&payment.external_ref)
        .bind(&payment.payment_url)
        .bind(payment.refunded_amount)
        .bind(&payment.error_message)
        .bind(payment.poll_attempts)
        .bind(payment.paid_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(row.map(|r| r.0))
    }

    async fn get_payment_for_reservation(&self, reservation_id: Uuid) -> StoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE reservation_id = $1")
            .bind(reservation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(row.map(|r| r.0))
    }

    async fn list_open_payments(&self) -> StoreResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM payments WHERE status IN ('PENDING', 'PROCESSING') ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn transition_payment(
        &self,
        id: Uuid,
        from: &[PaymentStatus],
        to: PaymentStatus,
        patch: PaymentPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            UPDATE payments SET
                status = $3,
                external_ref = COALESCE($4, external_ref),
                payment_url = COALESCE($5, payment_url),
                refunded_amount = COALESCE($6, refunded_amount),
                error_message = COALESCE($7, error_message),
                paid_at = COALESCE($8, paid_at),
                updated_at = $9
            WHERE id = $1 AND status = ANY($2)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(names(from))
        .bind(to.as_str())
        .bind(patch.external_ref)
        .bind(patch.payment_url)
        .bind(patch.refunded_amount)
        .bind(patch.error_message)
        .bind(patch.paid_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(row.map(|r| r.0))
    }

    async fn record_poll_attempt(&self, payment_id: Uuid) -> StoreResult<i32> {
        let attempts: Option<(i32,)> = sqlx::query_as(
            "UPDATE payments SET poll_attempts = poll_attempts + 1 WHERE id = $1 RETURNING poll_attempts",
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(attempts.map(|(n,)| n).unwrap_or(0))
    }

    async fn insert_ticket(&self, ticket: &Ticket) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tickets (id, reservation_id, credential, payload, status, used_at, redeemed_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(ticket.id)
        .bind(ticket.reservation_id)
        .bind(&ticket.credential)
        .bind(&ticket.payload)
        .bind(ticket.status.as_str())
        .bind(ticket.used_at)
        .bind(&ticket.redeemed_by)
        .bind(ticket.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn get_ticket_by_credential(&self, credential: &str) -> StoreResult<Option<Ticket>> {
        let row = sqlx::query_as::<_, TicketRow>("SELECT * FROM tickets WHERE credential = $1")
            .bind(credential)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(row.map(|r| r.0))
    }

    async fn get_ticket_for_reservation(&self, reservation_id: Uuid) -> StoreResult<Option<Ticket>> {
        let row = sqlx::query_as::<_, TicketRow>("SELECT * FROM tickets WHERE reservation_id = $1")
            .bind(reservation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(row.map(|r| r.0))
    }

    async fn mark_ticket_used(
        &self,
        ticket_id: Uuid,
        used_at: DateTime<Utc>,
        redeemed_by: &str,
    ) -> StoreResult<Option<Ticket>> {
        let row = sqlx::query_as::<_, TicketRow>(
            r#"
            UPDATE tickets SET status = 'USED', used_at = $2, redeemed_by = $3
            WHERE id = $1 AND status = 'ACTIVE'
            RETURNING *
            "#,
        )
        .bind(ticket_id)
        .bind(used_at)
        .bind(redeemed_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(row.map(|r| r.0))
    }

    async fn transition_ticket(
        &self,
        reservation_id: Uuid,
        from: &[TicketStatus],
        to: TicketStatus,
    ) -> StoreResult<Option<Ticket>> {
        let row = sqlx::query_as::<_, TicketRow>(
            r#"
            UPDATE tickets SET status = $3
            WHERE reservation_id = $1 AND status = ANY($2)
            RETURNING *
            "#,
        )
        .bind(reservation_id)
        .bind(names(from))
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(row.map(|r| r.0))
    }

    async fn find_promo(&self, code: &str) -> StoreResult<Option<PromoCode>> {
        let row = sqlx::query_as::<_, PromoRow>("SELECT * FROM promo_codes WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(row.map(|r| r.0))
    }

    async fn save_promo(&self, promo: &PromoCode) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO promo_codes (id, code, kind, value, max_uses, used_count, is_active, valid_from, valid_until)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                kind = EXCLUDED.kind,
                value = EXCLUDED.value,
                max_uses = EXCLUDED.max_uses,
                is_active = EXCLUDED.is_active,
                valid_from = EXCLUDED.valid_from,
                valid_until = EXCLUDED.valid_until
            "#,
        )
        .bind(promo.id)
        .bind(&promo.code)
        .bind(promo.kind.as_str())
        .bind(promo.value)
        .bind(promo.max_uses)
        .bind(promo.used_count)
        .bind(promo.is_active)
        .bind(promo.valid_from)
        .bind(promo.valid_until)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn increment_promo_use(&self, promo_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE promo_codes SET used_count = used_count + 1
            WHERE id = $1 AND (max_uses IS NULL OR used_count < max_uses)
            "#,
        )
        .bind(promo_id)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_maintenance(
        &self,
        court_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<MaintenanceWindow>> {
        let rows = sqlx::query_as::<_, MaintenanceRow>(
            r#"
            SELECT * FROM maintenance_windows
            WHERE court_id = $1 AND start_time < $3 AND $2 < end_time
            ORDER BY start_time
            "#,
        )
        .bind(court_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(rows.into_iter().map(MaintenanceWindow::from).collect())
    }

    async fn save_maintenance(&self, window: &MaintenanceWindow) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO maintenance_windows (id, court_id, title, start_time, end_time)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                start_time = EXCLUDED.start_time,
                end_time = EXCLUDED.end_time
            "#,
        )
        .bind(window.id)
        .bind(window.court_id)
        .bind(&window.title)
        .bind(window.start_time)
        .bind(window.end_time)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }
}
