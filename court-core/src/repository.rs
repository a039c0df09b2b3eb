use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    Court, CourtUpdate, Customer, MaintenanceWindow, Payment, PaymentPatch, PaymentStatus,
    PromoCode, Reservation, ReservationStatus, Ticket, TicketStatus,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness or exclusion rule rejected the write.
    #[error("Conflicting record: {0}")]
    Conflict(String),

    #[error("Storage backend failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable shared state of the booking core.
///
/// Every conditional method (`transition_*`, `mark_ticket_used`, `cancel_expired_holds`,
/// `increment_promo_use`) is a compare-and-swap: it applies only when the stored row still
/// matches the expected state and reports whether it did.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn get_court(&self, id: Uuid) -> StoreResult<Option<Court>>;

    async fn list_courts(&self) -> StoreResult<Vec<Court>>;

    async fn save_court(&self, court: &Court) -> StoreResult<()>;

    async fn update_court(&self, id: Uuid, update: &CourtUpdate) -> StoreResult<Option<Court>>;

    async fn get_customer(&self, id: &str) -> StoreResult<Option<Customer>>;

    async fn save_customer(&self, customer: &Customer) -> StoreResult<()>;

    /// Insert a HOLD. Serialized per court and local day: fails with
    /// [`StoreError::Conflict`] when an active reservation or a maintenance window
    /// overlaps `[start_time, end_time)`.
    async fn insert_hold(&self, reservation: &Reservation) -> StoreResult<()>;

    async fn get_reservation(&self, id: Uuid) -> StoreResult<Option<Reservation>>;

    /// Active (HOLD/PAID/CONFIRMED) reservations on `court_id` intersecting `[from, to)`,
    /// ordered by start.
    async fn list_active_reservations(
        &self,
        court_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Reservation>>;

    async fn list_customer_reservations(&self, customer_id: &str) -> StoreResult<Vec<Reservation>>;

    /// Reservations in `status`, optionally restricted to those ending at or before `ended_by`.
    async fn list_reservations_with_status(
        &self,
        status: ReservationStatus,
        ended_by: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Reservation>>;

    /// Move a reservation to `to` if its current status is one of `from`.
    /// Leaving HOLD clears `hold_expires_at`. Returns the updated row when applied.
    async fn transition_reservation(
        &self,
        id: Uuid,
        from: &[ReservationStatus],
        to: ReservationStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Reservation>>;

    /// Cancel every HOLD whose `hold_expires_at <= now`, re-checking both conditions
    /// at update time. Returns the rows actually cancelled.
    async fn cancel_expired_holds(&self, now: DateTime<Utc>) -> StoreResult<Vec<Reservation>>;

    /// Fails with [`StoreError::Conflict`] if the reservation already has a payment.
    async fn insert_payment(&self, payment: &Payment) -> StoreResult<()>;

    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<Payment>>;

    async fn get_payment_for_reservation(&self, reservation_id: Uuid) -> StoreResult<Option<Payment>>;

    async fn list_open_payments(&self) -> StoreResult<Vec<Payment>>;

    async fn transition_payment(
        &self,
        id: Uuid,
        from: &[PaymentStatus],
        to: PaymentStatus,
        patch: PaymentPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Payment>>;

    /// Increment and return the poll attempt counter.
    async fn record_poll_attempt(&self, payment_id: Uuid) -> StoreResult<i32>;

    /// Fails with [`StoreError::Conflict`] if the reservation already has a ticket
    /// or the credential is taken.
    async fn insert_ticket(&self, ticket: &Ticket) -> StoreResult<()>;

    async fn get_ticket_by_credential(&self, credential: &str) -> StoreResult<Option<Ticket>>;

    async fn get_ticket_for_reservation(&self, reservation_id: Uuid) -> StoreResult<Option<Ticket>>;

    /// ACTIVE → USED, stamping `used_at` and `redeemed_by`. `None` if the ticket was not ACTIVE.
    async fn mark_ticket_used(
        &self,
        ticket_id: Uuid,
        used_at: DateTime<Utc>,
        redeemed_by: &str,
    ) -> StoreResult<Option<Ticket>>;

    async fn transition_ticket(
        &self,
        reservation_id: Uuid,
        from: &[TicketStatus],
        to: TicketStatus,
    ) -> StoreResult<Option<Ticket>>;

    async fn find_promo(&self, code: &str) -> StoreResult<Option<PromoCode>>;

    async fn save_promo(&self, promo: &PromoCode) -> StoreResult<()>;

    /// Count one use if the code is still under `max_uses`. Returns whether it counted.
    async fn increment_promo_use(&self, promo_id: Uuid) -> StoreResult<bool>;

    async fn list_maintenance(
        &self,
        court_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<MaintenanceWindow>>;

    async fn save_maintenance(&self, window: &MaintenanceWindow) -> StoreResult<()>;
}
