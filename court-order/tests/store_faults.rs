use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use court_catalog::{AvailabilityCalculator, PricingConfig, PricingEngine, Venue};
use court_core::models::{
    Court, CourtUpdate, Customer, MaintenanceWindow, Payment, PaymentPatch, PaymentStatus,
    PromoCode, Reservation, ReservationStatus, Ticket, TicketStatus,
};
use court_core::{Actor, BookingStore, CoreError, Role, StoreError, StoreResult, TracingEventSink};
use court_order::{
    BookingPolicy, HoldRequest, InMemoryBookingStore, PaymentOrchestrator, ReservationManager,
    RetryPolicy, SettlementOutcome,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-memory store with injectable misbehaviour.
#[derive(Default)]
struct FaultyStore {
    inner: InMemoryBookingStore,
    /// Accept holds that overlap an active reservation instead of refusing them.
    accept_overlaps: bool,
    /// Cancel the reservation right before any payment is marked PAID.
    cancel_on_capture: bool,
    overlapping: Mutex<HashMap<Uuid, Reservation>>,
}

#[async_trait]
impl BookingStore for FaultyStore {
    async fn get_court(&self, id: Uuid) -> StoreResult<Option<Court>> {
        self.inner.get_court(id).await
    }

    async fn list_courts(&self) -> StoreResult<Vec<Court>> {
        self.inner.list_courts().await
    }

    async fn save_court(&self, court: &Court) -> StoreResult<()> {
        self.inner.save_court(court).await
    }

    async fn update_court(&self, id: Uuid, update: &CourtUpdate) -> StoreResult<Option<Court>> {
        self.inner.update_court(id, update).await
    }

    async fn get_customer(&self, id: &str) -> StoreResult<Option<Customer>> {
        self.inner.get_customer(id).await
    }

    async fn save_customer(&self, customer: &Customer) -> StoreResult<()> {
        self.inner.save_customer(customer).await
    }

    async fn insert_hold(&self, reservation: &Reservation) -> StoreResult<()> {
        match self.inner.insert_hold(reservation).await {
            Err(StoreError::Conflict(_)) if self.accept_overlaps => {
                self.overlapping
                    .lock()
                    .await
                    .insert(reservation.id, reservation.clone());
                Ok(())
            }
            other => other,
        }
    }

    async fn get_reservation(&self, id: Uuid) -> StoreResult<Option<Reservation>> {
        if let Some(found) = self.overlapping.lock().await.get(&id) {
            return Ok(Some(found.clone()));
        }
        self.inner.get_reservation(id).await
    }

    async fn list_active_reservations(
        &self,
        court_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Reservation>> {
        let mut active = self.inner.list_active_reservations(court_id, from, to).await?;
        active.extend(
            self.overlapping
                .lock()
                .await
                .values()
                .filter(|r| r.court_id == court_id && r.status.is_active() && r.overlaps(from, to))
                .cloned(),
        );
        active.sort_by_key(|r| r.start_time);
        Ok(active)
    }

    async fn list_customer_reservations(&self, customer_id: &str) -> StoreResult<Vec<Reservation>> {
        self.inner.list_customer_reservations(customer_id).await
    }

    async fn list_reservations_with_status(
        &self,
        status: ReservationStatus,
        ended_by: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Reservation>> {
        self.inner.list_reservations_with_status(status, ended_by).await
    }

    async fn transition_reservation(
        &self,
        id: Uuid,
        from: &[ReservationStatus],
        to: ReservationStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Reservation>> {
        if let Some(row) = self.overlapping.lock().await.get_mut(&id) {
            if !from.contains(&row.status) {
                return Ok(None);
            }
            row.status = to;
            row.hold_expires_at = None;
            row.cancellation_reason = reason.map(str::to_string);
            row.updated_at = now;
            return Ok(Some(row.clone()));
        }
        self.inner.transition_reservation(id, from, to, reason, now).await
    }

    async fn cancel_expired_holds(&self, now: DateTime<Utc>) -> StoreResult<Vec<Reservation>> {
        self.inner.cancel_expired_holds(now).await
    }

    async fn insert_payment(&self, payment: &Payment) -> StoreResult<()> {
        self.inner.insert_payment(payment).await
    }

    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        self.inner.get_payment(id).await
    }

    async fn get_payment_for_reservation(&self, reservation_id: Uuid) -> StoreResult<Option<Payment>> {
        self.inner.get_payment_for_reservation(reservation_id).await
    }

    async fn list_open_payments(&self) -> StoreResult<Vec<Payment>> {
        self.inner.list_open_payments().await
    }

    async fn transition_payment(
        &self,
        id: Uuid,
        from: &[PaymentStatus],
        to: PaymentStatus,
        patch: PaymentPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Payment>> {
        if self.cancel_on_capture && to == PaymentStatus::Paid {
            if let Some(payment) = self.inner.get_payment(id).await? {
                self.inner
                    .transition_reservation(
                        payment.reservation_id,
                        &ReservationStatus::ACTIVE,
                        ReservationStatus::Cancelled,
                        Some("cancelled by customer"),
                        now,
                    )
                    .await?;
            }
        }
        self.inner.transition_payment(id, from, to, patch, now).await
    }

    async fn record_poll_attempt(&self, payment_id: Uuid) -> StoreResult<i32> {
        self.inner.record_poll_attempt(payment_id).await
    }

    async fn insert_ticket(&self, ticket: &Ticket) -> StoreResult<()> {
        self.inner.insert_ticket(ticket).await
    }

    async fn get_ticket_by_credential(&self, credential: &str) -> StoreResult<Option<Ticket>> {
        self.inner.get_ticket_by_credential(credential).await
    }

    async fn get_ticket_for_reservation(&self, reservation_id: Uuid) -> StoreResult<Option<Ticket>> {
        self.inner.get_ticket_for_reservation(reservation_id).await
    }

    async fn mark_ticket_used(
        &self,
        ticket_id: Uuid,
        used_at: DateTime<Utc>,
        redeemed_by: &str,
    ) -> StoreResult<Option<Ticket>> {
        self.inner.mark_ticket_used(ticket_id, used_at, redeemed_by).await
    }

    async fn transition_ticket(
        &self,
        reservation_id: Uuid,
        from: &[TicketStatus],
        to: TicketStatus,
    ) -> StoreResult<Option<Ticket>> {
        self.inner.transition_ticket(reservation_id, from, to).await
    }

    async fn find_promo(&self, code: &str) -> StoreResult<Option<PromoCode>> {
        self.inner.find_promo(code).await
    }

    async fn save_promo(&self, promo: &PromoCode) -> StoreResult<()> {
        self.inner.save_promo(promo).await
    }

    async fn increment_promo_use(&self, promo_id: Uuid) -> StoreResult<bool> {
        self.inner.increment_promo_use(promo_id).await
    }

    async fn list_maintenance(
        &self,
        court_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<MaintenanceWindow>> {
        self.inner.list_maintenance(court_id, from, to).await
    }

    async fn save_maintenance(&self, window: &MaintenanceWindow) -> StoreResult<()> {
        self.inner.save_maintenance(window).await
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 12, 7, 3, 0, 0).unwrap()
}

async fn setup(store: FaultyStore) -> (Arc<FaultyStore>, Arc<ReservationManager>, PaymentOrchestrator, HoldRequest) {
    let store = Arc::new(store);
    let venue = Venue::new(300, 6, 23).unwrap();
    let pricing = PricingConfig::default();

    let manager = Arc::new(ReservationManager::new(
        store.clone(),
        PricingEngine::new(pricing.clone()),
        AvailabilityCalculator::new(venue, pricing.peak),
        BookingPolicy::default(),
        Arc::new(TracingEventSink),
    ));
    let payments =
        PaymentOrchestrator::new(store.clone(), manager.clone(), RetryPolicy::default(), false);

    let court = Court::new("Court 1", Decimal::from(50000), Decimal::from(30000));
    store.save_court(&court).await.unwrap();

    let start = venue.at(NaiveDate::from_ymd_opt(2024, 12, 7).unwrap(), 19);
    let request = HoldRequest { court_id: court.id, start, promo_code: None };
    (store, manager, payments, request)
}

#[tokio::test]
async fn test_overlap_slipping_past_the_store_is_an_invariant_violation() {
    let (store, manager, _, request) =
        setup(FaultyStore { accept_overlaps: true, ..FaultyStore::default() }).await;

    let first = manager
        .create_hold(&Actor::customer("alice"), &request, now())
        .await
        .unwrap();

    let second = manager.create_hold(&Actor::customer("bob"), &request, now()).await;
    match second {
        Err(CoreError::InvariantViolation(msg)) => assert!(msg.contains(&first.id.to_string())),
        other => panic!("expected InvariantViolation, got {:?}", other),
    }

    let overlapping = store.overlapping.lock().await;
    let intruder = overlapping.values().next().unwrap();
    assert_eq!(intruder.customer_id, "bob");
    assert_eq!(intruder.status, ReservationStatus::Cancelled);
    assert_eq!(intruder.cancellation_reason.as_deref(), Some("overlap detected after insert"));
    drop(overlapping);

    let kept = store.get_reservation(first.id).await.unwrap().unwrap();
    assert_eq!(kept.status, ReservationStatus::Hold);
}

#[tokio::test]
async fn test_cash_recorded_after_a_racing_cancel_is_refunded() {
    let (store, manager, payments, request) =
        setup(FaultyStore { cancel_on_capture: true, ..FaultyStore::default() }).await;
    let desk = Actor::new("m-1", Role::Manager);

    let hold = manager
        .create_hold(&Actor::customer("alice"), &request, now())
        .await
        .unwrap();

    let outcome = payments
        .confirm_manual_payment(&desk, hold.id, now() + Duration::minutes(1))
        .await
        .unwrap();
    assert!(matches!(outcome, SettlementOutcome::Released(_)));

    let payment = store.get_payment_for_reservation(hold.id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert_eq!(payment.refunded_amount, Some(hold.pricing.final_amount));
    assert!(store.get_ticket_for_reservation(hold.id).await.unwrap().is_none());
}
