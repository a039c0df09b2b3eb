use async_trait::async_trait;
use chrono::{DateTime, Utc};
use court_core::models::{
    Court, CourtUpdate, Customer, MaintenanceWindow, Payment, PaymentPatch, PaymentStatus,
    PromoCode, Reservation, ReservationStatus, Ticket, TicketStatus,
};
use court_core::{BookingStore, StoreError, StoreResult};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    courts: HashMap<Uuid, Court>,
    customers: HashMap<String, Customer>,
    reservations: HashMap<Uuid, Reservation>,
    payments: HashMap<Uuid, Payment>,
    tickets: HashMap<Uuid, Ticket>,
    promos: HashMap<String, PromoCode>,
    maintenance: Vec<MaintenanceWindow>,
}

/// [`BookingStore`] kept in process memory. Every call runs under one lock, so each
/// method behaves like a serializable transaction. Used by tests and local runs.
#[derive(Default)]
pub struct InMemoryBookingStore {
    tables: Mutex<Tables>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn get_court(&self, id: Uuid) -> StoreResult<Option<Court>> {
        Ok(self.tables.lock().await.courts.get(&id).cloned())
    }

    async fn list_courts(&self) -> StoreResult<Vec<Court>> {
        let tables = self.tables.lock().await;
        let mut courts: Vec<Court> = tables.courts.values().cloned().collect();
        courts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(courts)
    }

    async fn save_court(&self, court: &Court) -> StoreResult<()> {
        self.tables.lock().await.courts.insert(court.id, court.clone());
        Ok(())
    }

    async fn update_court(&self, id: Uuid, update: &CourtUpdate) -> StoreResult<Option<Court>> {
        let mut tables = self.tables.lock().await;
        let Some(court) = tables.courts.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(active) = update.is_active {
            court.is_active = active;
        }
        if let Some(rate) = update.hourly_rate_peak {
            court.hourly_rate_peak = rate;
        }
        if let Some(rate) = update.hourly_rate_offpeak {
            court.hourly_rate_offpeak = rate;
        }
        Ok(Some(court.clone()))
    }

    async fn get_customer(&self, id: &str) -> StoreResult<Option<Customer>> {
        Ok(self.tables.lock().await.customers.get(id).cloned())
    }

    async fn save_customer(&self, customer: &Customer) -> StoreResult<()> {
        self.tables
            .lock()
            .await
            .customers
            .insert(customer.id.clone(), customer.clone());
        Ok(())
    }

    async fn insert_hold(&self, reservation: &Reservation) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;

        let taken = tables.reservations.values().any(|r| {
            r.court_id == reservation.court_id
                && r.status.is_active()
                && r.overlaps(reservation.start_time, reservation.end_time)
        });
        if taken {
            return Err(StoreError::Conflict(format!(
                "court {} is already reserved at {}",
                reservation.court_id, reservation.start_time
            )));
        }

        let closed = tables.maintenance.iter().any(|m| {
            m.court_id == reservation.court_id
                && m.overlaps(reservation.start_time, reservation.end_time)
        });
        if closed {
            return Err(StoreError::Conflict(format!(
                "court {} is under maintenance at {}",
                reservation.court_id, reservation.start_time
            )));
        }

        tables.reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn get_reservation(&self, id: Uuid) -> StoreResult<Option<Reservation>> {
        Ok(self.tables.lock().await.reservations.get(&id).cloned())
    }

    async fn list_active_reservations(
        &self,
        court_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Reservation>> {
        let tables = self.tables.lock().await;
        let mut found: Vec<Reservation> = tables
            .reservations
            .values()
            .filter(|r| r.court_id == court_id && r.status.is_active() && r.overlaps(from, to))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.start_time);
        Ok(found)
    }

    async fn list_customer_reservations(&self, customer_id: &str) -> StoreResult<Vec<Reservation>> {
        let tables = self.tables.lock().await;
        let mut found: Vec<Reservation> = tables
            .reservations
            .values()
            .filter(|r| r.customer_id == customer_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(found)
    }

    async fn list_reservations_with_status(
        &self,
        status: ReservationStatus,
        ended_by: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Reservation>> {
        let tables = self.tables.lock().await;
        let mut found: Vec<Reservation> = tables
            .reservations
            .values()
            .filter(|r| r.status == status)
            .filter(|r| ended_by.map(|at| r.end_time <= at).unwrap_or(true))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.start_time);
        Ok(found)
    }

    async fn transition_reservation(
        &self,
        id: Uuid,
        from: &[ReservationStatus],
        to: ReservationStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Reservation>> {
        let mut tables = self.tables.lock().await;
        let Some(reservation) = tables.reservations.get_mut(&id) else {
            return Ok(None);
        };
        if !from.contains(&reservation.status) {
            return Ok(None);
        }

        reservation.status = to;
        if to != ReservationStatus::Hold {
            reservation.hold_expires_at = None;
        }
        if let Some(reason) = reason {
            reservation.cancellation_reason = Some(reason.to_string());
        }
        reservation.updated_at = now;
        Ok(Some(reservation.clone()))
    }

    async fn cancel_expired_holds(&self, now: DateTime<Utc>) -> StoreResult<Vec<Reservation>> {
        let mut tables = self.tables.lock().await;
        let mut released = Vec::new();
        for reservation in tables.reservations.values_mut() {
            if reservation.is_hold_expired(now) {
                reservation.status = ReservationStatus::Cancelled;
                reservation.hold_expires_at = None;
                reservation.cancellation_reason = Some("hold expired".to_string());
                reservation.updated_at = now;
                released.push(reservation.clone());
            }
        }
        released.sort_by_key(|r| r.start_time);
        Ok(released)
    }

    async fn insert_payment(&self, payment: &Payment) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if tables
            .payments
            .values()
            .any(|p| p.reservation_id == payment.reservation_id)
        {
            return Err(StoreError::Conflict(format!(
                "reservation {} already has a payment",
                payment.reservation_id
            )));
        }
        tables.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.tables.lock().await.payments.get(&id).cloned())
    }

    async fn get_payment_for_reservation(&self, reservation_id: Uuid) -> StoreResult<Option<Payment>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .payments
            .values()
            .find(|p| p.reservation_id == reservation_id)
            .cloned())
    }

    async fn list_open_payments(&self) -> StoreResult<Vec<Payment>> {
        let tables = self.tables.lock().await;
        let mut found: Vec<Payment> = tables
            .payments
            .values()
            .filter(|p| PaymentStatus::OPEN.contains(&p.status))
            .cloned()
            .collect();
        found.sort_by_key(|p| p.created_at);
        Ok(found)
    }

    async fn transition_payment(
        &self,
        id: Uuid,
        from: &[PaymentStatus],
        to: PaymentStatus,
        patch: PaymentPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Payment>> {
        let mut tables = self.tables.lock().await;
        let Some(payment) = tables.payments.get_mut(&id) else {
            return Ok(None);
        };
        if !from.contains(&payment.status) {
            return Ok(None);
        }

        payment.status = to;
        if let Some(external_ref) = patch.external_ref {
            payment.external_ref = Some(external_ref);
        }
        if let Some(url) = patch.payment_url {
            payment.payment_url = Some(url);
        }
        if let Some(refunded) = patch.refunded_amount {
            payment.refunded_amount = Some(refunded);
        }
        if let Some(message) = patch.error_message {
            payment.error_message = Some(message);
        }
        if let Some(paid_at) = patch.paid_at {
            payment.paid_at = Some(paid_at);
        }
        payment.updated_at = now;
        Ok(Some(payment.clone()))
    }

    async fn record_poll_attempt(&self, payment_id: Uuid) -> StoreResult<i32> {
        let mut tables = self.tables.lock().await;
        match tables.payments.get_mut(&payment_id) {
            Some(payment) => {
                payment.poll_attempts += 1;
                Ok(payment.poll_attempts)
            }
            None => Ok(0),
        }
    }

    async fn insert_ticket(&self, ticket: &Ticket) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.tickets.values().any(|t| {
            t.reservation_id == ticket.reservation_id || t.credential == ticket.credential
        }) {
            return Err(StoreError::Conflict(format!(
                "ticket for reservation {} already exists",
                ticket.reservation_id
            )));
        }
        tables.tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn get_ticket_by_credential(&self, credential: &str) -> StoreResult<Option<Ticket>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tickets
            .values()
            .find(|t| t.credential == credential)
            .cloned())
    }

    async fn get_ticket_for_reservation(&self, reservation_id: Uuid) -> StoreResult<Option<Ticket>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tickets
            .values()
            .find(|t| t.reservation_id == reservation_id)
            .cloned())
    }

    async fn mark_ticket_used(
        &self,
        ticket_id: Uuid,
        used_at: DateTime<Utc>,
        redeemed_by: &str,
    ) -> StoreResult<Option<Ticket>> {
        let mut tables = self.tables.lock().await;
        match tables.tickets.get_mut(&ticket_id) {
            Some(ticket) if ticket.status == TicketStatus::Active => {
                ticket.status = TicketStatus::Used;
                ticket.used_at = Some(used_at);
                ticket.redeemed_by = Some(redeemed_by.to_string());
                Ok(Some(ticket.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn transition_ticket(
        &self,
        reservation_id: Uuid,
        from: &[TicketStatus],
        to: TicketStatus,
    ) -> StoreResult<Option<Ticket>> {
        let mut tables = self.tables.lock().await;
        let ticket = tables
            .tickets
            .values_mut()
            .find(|t| t.reservation_id == reservation_id && from.contains(&t.status));
        Ok(ticket.map(|t| {
            t.status = to;
            t.clone()
        }))
    }

    async fn find_promo(&self, code: &str) -> StoreResult<Option<PromoCode>> {
        Ok(self.tables.lock().await.promos.get(code).cloned())
    }

    async fn save_promo(&self, promo: &PromoCode) -> StoreResult<()> {
        self.tables
            .lock()
            .await
            .promos
            .insert(promo.code.clone(), promo.clone());
        Ok(())
    }

    async fn increment_promo_use(&self, promo_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let Some(promo) = tables.promos.values_mut().find(|p| p.id == promo_id) else {
            return Ok(false);
        };
        if promo.max_uses.is_some_and(|max| promo.used_count >= max) {
            return Ok(false);
        }
        promo.used_count += 1;
        Ok(true)
    }

    async fn list_maintenance(
        &self,
        court_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<MaintenanceWindow>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .maintenance
            .iter()
            .filter(|m| m.court_id == court_id && m.overlaps(from, to))
            .cloned()
            .collect())
    }

    async fn save_maintenance(&self, window: &MaintenanceWindow) -> StoreResult<()> {
        self.tables.lock().await.maintenance.push(window.clone());
        Ok(())
    }
}
