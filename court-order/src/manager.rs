use chrono::{DateTime, NaiveDate, Utc};
use court_catalog::{promo, AvailabilityCalculator, PriceRequest, PricingEngine, Slot};
use court_core::models::{
    Court, CourtUpdate, Customer, Payment, PaymentStatus, PriceBreakdown, PromoCode, Reservation,
    ReservationStatus, Ticket, TicketStatus,
};
use court_core::{
    Actor, BookingStore, Capability, CoreError, CoreResult, EventSink, StoreError,
};
use court_shared::BookingEvent;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::policy::{BookingPolicy, RefundDecision};
use crate::tickets::TicketService;

/// A customer's slot selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldRequest {
    pub court_id: Uuid,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub promo_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub court_id: Uuid,
    pub slot: Slot,
    pub pricing: PriceBreakdown,
    pub promo_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourtAvailability {
    pub court: Court,
    pub slots: Vec<Slot>,
}

/// Reservation with the records it owns.
#[derive(Debug, Clone, Serialize)]
pub struct ReservationDetails {
    pub reservation: Reservation,
    pub payment: Option<Payment>,
    pub ticket: Option<Ticket>,
}

/// Refund owed on a cancelled reservation. Executing it is the payment side's job.
#[derive(Debug, Clone, Serialize)]
pub struct PendingRefund {
    pub payment: Payment,
    pub decision: RefundDecision,
}

#[derive(Debug, Clone, Serialize)]
pub struct Cancellation {
    pub reservation: Reservation,
    pub refund: Option<PendingRefund>,
}

/// Result of delivering a payment-success notification.
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    Confirmed { reservation: Reservation, ticket: Ticket },
    /// Duplicate notification; nothing changed.
    AlreadyConfirmed(Reservation),
    /// The reservation was cancelled before the money arrived.
    Released(Reservation),
}

/// Owns the reservation lifecycle:
/// HOLD → PAID → CONFIRMED → COMPLETED | NO_SHOW, with CANCELLED reachable from HOLD/PAID/CONFIRMED.
///
/// Every transition is a conditional store update, so concurrent callers (sweeper, pollers,
/// request handlers) never apply the same transition twice.
pub struct ReservationManager {
    store: Arc<dyn BookingStore>,
    pricing: PricingEngine,
    availability: AvailabilityCalculator,
    policy: BookingPolicy,
    tickets: TicketService,
    events: Arc<dyn EventSink>,
}

impl ReservationManager {
    pub fn new(
        store: Arc<dyn BookingStore>,
        pricing: PricingEngine,
        availability: AvailabilityCalculator,
        policy: BookingPolicy,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let tickets = TicketService::new(
            store.clone(),
            *availability.venue(),
            policy.clone(),
            events.clone(),
        );
        Self { store, pricing, availability, policy, tickets, events }
    }

    pub fn tickets(&self) -> &TicketService {
        &self.tickets
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    pub fn calculator(&self) -> &AvailabilityCalculator {
        &self.availability
    }

    pub async fn courts(&self) -> CoreResult<Vec<Court>> {
        Ok(self.store.list_courts().await?)
    }

    /// Edit rates or (de)activate a court. Courts are never deleted; deactivation hides
    /// availability and refuses new holds but leaves existing reservations alone.
    pub async fn update_court(
        &self,
        actor: &Actor,
        id: Uuid,
        update: &CourtUpdate,
    ) -> CoreResult<Court> {
        actor.require(Capability::AdministerCourts)?;

        let negative = [update.hourly_rate_peak, update.hourly_rate_offpeak]
            .iter()
            .flatten()
            .any(|rate| rate.is_sign_negative());
        if negative {
            return Err(CoreError::Validation("hourly rates must not be negative".to_string()));
        }

        let court = self
            .store
            .update_court(id, update)
            .await?
            .ok_or_else(|| CoreError::not_found("court", id))?;

        info!(court_id = %id, is_active = court.is_active, updated_by = %actor.id, "Court updated");
        Ok(court)
    }

    /// Free slots on `date` for one court, or for every court when `court_id` is `None`.
    pub async fn availability(
        &self,
        court_id: Option<Uuid>,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<CourtAvailability>> {
        let courts = match court_id {
            Some(id) => vec![self.court(id).await?],
            None => self.store.list_courts().await?,
        };

        let (from, to) = self.availability.venue().day_bounds(date);
        let mut result = Vec::with_capacity(courts.len());
        for court in courts {
            let reservations = self.store.list_active_reservations(court.id, from, to).await?;
            let maintenance = self.store.list_maintenance(court.id, from, to).await?;
            let slots = self
                .availability
                .free_slots(date, &court, &reservations, &maintenance, now);
            result.push(CourtAvailability { court, slots });
        }
        Ok(result)
    }

    /// Price a slot for `actor` without placing a hold.
    pub async fn quote(
        &self,
        actor: &Actor,
        request: &HoldRequest,
        now: DateTime<Utc>,
    ) -> CoreResult<Quote> {
        let court = self.court(request.court_id).await?;
        let slot = self.availability.resolve_slot(request.start, now)?;
        let customer = self.store.get_customer(&actor.id).await?;
        let promo = self.resolve_promo(request.promo_code.as_deref(), now).await?;

        let pricing = self.price(&court, &slot, customer.as_ref(), promo.as_ref())?;
        Ok(Quote {
            court_id: court.id,
            slot,
            pricing,
            promo_code: promo.map(|p| p.code),
        })
    }

    pub async fn create_hold(
        &self,
        actor: &Actor,
        request: &HoldRequest,
        now: DateTime<Utc>,
    ) -> CoreResult<Reservation> {
        actor.require(Capability::PlaceHold)?;

        let customer = self.ensure_customer(actor).await?;
        if customer.is_blocked {
            return Err(CoreError::Forbidden(format!("customer {} is blocked", customer.id)));
        }

        let court = self.court(request.court_id).await?;
        if !court.is_active {
            return Err(CoreError::InvalidState(format!("court {} is not active", court.id)));
        }

        let slot = self.availability.resolve_slot(request.start, now)?;
        let promo = self.resolve_promo(request.promo_code.as_deref(), now).await?;
        let pricing = self.price(&court, &slot, Some(&customer), promo.as_ref())?;

        let reservation = Reservation::hold(
            court.id,
            customer.id.clone(),
            slot.start,
            slot.end,
            pricing,
            promo.map(|p| p.code),
            now,
            self.policy.hold_ttl,
        );

        match self.store.insert_hold(&reservation).await {
            Ok(()) => {}
            Err(StoreError::Conflict(msg)) => {
                info!(court_id = %court.id, start = %slot.start, "Slot conflict: {}", msg);
                return Err(CoreError::SlotConflict { court_id: court.id, start: slot.start });
            }
            Err(e) => return Err(e.into()),
        }

        self.verify_exclusive(&reservation, now).await?;

        info!(
            reservation_id = %reservation.id,
            court_id = %court.id,
            customer_id = %customer.id,
            start = %reservation.start_time,
            "Hold placed"
        );

        let hold_expires_at = reservation.hold_expires_at.unwrap_or(now + self.policy.hold_ttl);
        self.events
            .publish(BookingEvent::HoldPlaced {
                reservation_id: reservation.id,
                court_id: reservation.court_id,
                customer_id: reservation.customer_id.clone(),
                start_time: reservation.start_time,
                end_time: reservation.end_time,
                hold_expires_at,
                final_amount: reservation.pricing.final_amount,
            })
            .await;

        Ok(reservation)
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> CoreResult<ReservationDetails> {
        let reservation = self.reservation(id).await?;
        actor.require_owner_or_staff(&reservation.customer_id)?;

        let payment = self.store.get_payment_for_reservation(id).await?;
        let ticket = self.store.get_ticket_for_reservation(id).await?;
        Ok(ReservationDetails { reservation, payment, ticket })
    }

    /// The actor's own reservations, newest first.
    pub async fn list_for(&self, actor: &Actor) -> CoreResult<Vec<Reservation>> {
        actor.require(Capability::ManageOwnReservations)?;
        Ok(self.store.list_customer_reservations(&actor.id).await?)
    }

    /// Cancel on behalf of the owner or staff. Allowed from HOLD, PAID and CONFIRMED until
    /// the slot starts or the ticket is redeemed; late cancellations get the partial refund
    /// branch, never a refusal.
    pub async fn cancel(&self, actor: &Actor, id: Uuid, now: DateTime<Utc>) -> CoreResult<Cancellation> {
        let reservation = self.reservation(id).await?;
        actor.require_owner_or_staff(&reservation.customer_id)?;

        if reservation.start_time <= now {
            return Err(CoreError::InvalidState(format!(
                "reservation {} started at {} and can no longer be cancelled",
                id, reservation.start_time
            )));
        }
        let checked_in = self
            .store
            .get_ticket_for_reservation(id)
            .await?
            .is_some_and(|t| t.status == TicketStatus::Used);
        if checked_in {
            return Err(CoreError::InvalidState(format!(
                "reservation {} is checked in and can no longer be cancelled",
                id
            )));
        }

        let reason = if actor.id == reservation.customer_id {
            "cancelled by customer".to_string()
        } else {
            format!("cancelled by {}", actor.id)
        };

        let cancelled = self
            .store
            .transition_reservation(
                id,
                &ReservationStatus::ACTIVE,
                ReservationStatus::Cancelled,
                Some(&reason),
                now,
            )
            .await?
            .ok_or_else(|| {
                CoreError::InvalidState(format!(
                    "reservation {} is {} and cannot be cancelled",
                    id, reservation.status
                ))
            })?;

        self.store
            .transition_ticket(id, &[TicketStatus::Active], TicketStatus::Cancelled)
            .await?;

        let refund = match self.store.get_payment_for_reservation(id).await? {
            Some(payment) if payment.status == PaymentStatus::Paid => {
                let decision = self.policy.refund_for(payment.amount, cancelled.start_time, now);
                Some(PendingRefund { payment, decision })
            }
            _ => None,
        };

        info!(reservation_id = %id, reason = %reason, "Reservation cancelled");
        self.events
            .publish(BookingEvent::ReservationCancelled {
                reservation_id: id,
                court_id: cancelled.court_id,
                reason,
                refund_amount: refund.as_ref().map(|r| r.decision.amount),
                timestamp: now.timestamp(),
            })
            .await;

        Ok(Cancellation { reservation: cancelled, refund })
    }

    /// Apply a payment-success notification. Safe to deliver any number of times.
    pub async fn apply_payment_success(
        &self,
        reservation_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<SettlementOutcome> {
        self.store
            .transition_reservation(
                reservation_id,
                &[ReservationStatus::Hold],
                ReservationStatus::Paid,
                None,
                now,
            )
            .await?;

        let confirmed = self
            .store
            .transition_reservation(
                reservation_id,
                &[ReservationStatus::Paid],
                ReservationStatus::Confirmed,
                None,
                now,
            )
            .await?;

        let Some(reservation) = confirmed else {
            let current = self.reservation(reservation_id).await?;
            return match current.status {
                ReservationStatus::Confirmed
                | ReservationStatus::Completed
                | ReservationStatus::NoShow => {
                    warn!(%reservation_id, "Duplicate payment success ignored");
                    Ok(SettlementOutcome::AlreadyConfirmed(current))
                }
                ReservationStatus::Cancelled => {
                    warn!(%reservation_id, "Payment arrived for a cancelled reservation");
                    Ok(SettlementOutcome::Released(current))
                }
                ReservationStatus::Hold | ReservationStatus::Paid => {
                    Err(CoreError::InvalidState(format!(
                        "reservation {} changed concurrently",
                        reservation_id
                    )))
                }
            };
        };

        let ticket = self.tickets.issue(&reservation, now).await?;
        self.count_promo_use(&reservation).await;

        info!(%reservation_id, credential = %ticket.credential, "Reservation confirmed");
        self.events
            .publish(BookingEvent::ReservationConfirmed {
                reservation_id,
                court_id: reservation.court_id,
                customer_id: reservation.customer_id.clone(),
                credential: ticket.credential.clone(),
                timestamp: now.timestamp(),
            })
            .await;

        Ok(SettlementOutcome::Confirmed { reservation, ticket })
    }

    /// Payment failed or was cancelled by the provider. Releases the slot if still held.
    pub async fn apply_payment_failure(
        &self,
        reservation_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<Reservation>> {
        let cancelled = self
            .store
            .transition_reservation(
                reservation_id,
                &[ReservationStatus::Hold, ReservationStatus::Paid],
                ReservationStatus::Cancelled,
                Some(reason),
                now,
            )
            .await?;

        match &cancelled {
            Some(reservation) => {
                info!(%reservation_id, %reason, "Reservation cancelled after payment failure");
                self.events
                    .publish(BookingEvent::ReservationCancelled {
                        reservation_id,
                        court_id: reservation.court_id,
                        reason: reason.to_string(),
                        refund_amount: None,
                        timestamp: now.timestamp(),
                    })
                    .await;
            }
            None => warn!(%reservation_id, "Payment failure for a reservation no longer pending"),
        }
        Ok(cancelled)
    }

    /// Cancel every hold past its TTL. Payment-success transitions racing this one are
    /// resolved by the store's conditional update.
    pub async fn release_expired_holds(&self, now: DateTime<Utc>) -> CoreResult<Vec<Reservation>> {
        let released = self.store.cancel_expired_holds(now).await?;

        for reservation in &released {
            info!(reservation_id = %reservation.id, court_id = %reservation.court_id, "Hold expired");
            self.events
                .publish(BookingEvent::HoldExpired {
                    reservation_id: reservation.id,
                    court_id: reservation.court_id,
                    start_time: reservation.start_time,
                    timestamp: now.timestamp(),
                })
                .await;
        }
        Ok(released)
    }

    /// Finish interrupted confirmations: PAID reservations and CONFIRMED ones without a ticket.
    pub async fn reconcile(&self, now: DateTime<Utc>) -> CoreResult<usize> {
        let mut repaired = 0;

        for reservation in self
            .store
            .list_reservations_with_status(ReservationStatus::Paid, None)
            .await?
        {
            if let SettlementOutcome::Confirmed { .. } =
                self.apply_payment_success(reservation.id, now).await?
            {
                repaired += 1;
            }
        }

        for reservation in self
            .store
            .list_reservations_with_status(ReservationStatus::Confirmed, None)
            .await?
        {
            if self.store.get_ticket_for_reservation(reservation.id).await?.is_some() {
                continue;
            }
            warn!(reservation_id = %reservation.id, "Confirmed reservation without ticket");
            match self.tickets.issue(&reservation, now).await {
                Ok(_) => repaired += 1,
                // Issued concurrently since the listing.
                Err(CoreError::InvalidState(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(repaired)
    }

    /// Close CONFIRMED reservations whose end has passed: COMPLETED if the ticket was used,
    /// NO_SHOW otherwise.
    pub async fn settle_finished(&self, now: DateTime<Utc>) -> CoreResult<Vec<Reservation>> {
        let finished = self
            .store
            .list_reservations_with_status(ReservationStatus::Confirmed, Some(now))
            .await?;

        let mut settled = Vec::with_capacity(finished.len());
        for reservation in finished {
            let ticket = self.store.get_ticket_for_reservation(reservation.id).await?;
            let checked_in = ticket
                .as_ref()
                .map(|t| t.status == TicketStatus::Used)
                .unwrap_or(false);

            let target = if checked_in {
                ReservationStatus::Completed
            } else {
                ReservationStatus::NoShow
            };

            let Some(updated) = self
                .store
                .transition_reservation(
                    reservation.id,
                    &[ReservationStatus::Confirmed],
                    target,
                    None,
                    now,
                )
                .await?
            else {
                continue;
            };

            if !checked_in {
                self.store
                    .transition_ticket(reservation.id, &[TicketStatus::Active], TicketStatus::Expired)
                    .await?;
            }

            info!(reservation_id = %updated.id, status = %updated.status, "Reservation settled");
            self.events
                .publish(BookingEvent::ReservationSettled {
                    reservation_id: updated.id,
                    status: updated.status.to_string(),
                    timestamp: now.timestamp(),
                })
                .await;
            settled.push(updated);
        }
        Ok(settled)
    }

    async fn court(&self, id: Uuid) -> CoreResult<Court> {
        self.store
            .get_court(id)
            .await?
            .ok_or_else(|| CoreError::not_found("court", id))
    }

    async fn reservation(&self, id: Uuid) -> CoreResult<Reservation> {
        self.store
            .get_reservation(id)
            .await?
            .ok_or_else(|| CoreError::not_found("reservation", id))
    }

    /// First contact registers the caller as a regular customer.
    async fn ensure_customer(&self, actor: &Actor) -> CoreResult<Customer> {
        if let Some(customer) = self.store.get_customer(&actor.id).await? {
            return Ok(customer);
        }
        let mut customer = Customer::new(actor.id.clone(), actor.id.clone());
        customer.role = actor.role;
        self.store.save_customer(&customer).await?;
        Ok(customer)
    }

    async fn resolve_promo(
        &self,
        code: Option<&str>,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<PromoCode>> {
        let Some(code) = code.map(promo::normalize_code).filter(|c| !c.is_empty()) else {
            return Ok(None);
        };
        let found = self
            .store
            .find_promo(&code)
            .await?
            .ok_or_else(|| CoreError::Validation(format!("unknown promo code '{}'", code)))?;
        promo::validate(&found, now)?;
        Ok(Some(found))
    }

    fn price(
        &self,
        court: &Court,
        slot: &Slot,
        customer: Option<&Customer>,
        promo: Option<&PromoCode>,
    ) -> CoreResult<PriceBreakdown> {
        let request = PriceRequest {
            peak_rate: court.hourly_rate_peak,
            offpeak_rate: court.hourly_rate_offpeak,
            duration_hours: Decimal::from((slot.end - slot.start).num_hours()),
            start: self.availability.venue().local(slot.start),
            is_vip: customer.map(|c| c.is_vip).unwrap_or(false),
            promo_discount: Decimal::ZERO,
        };
        self.pricing.price_with_promo(&request, promo)
    }

    /// Post-insert check that no other active reservation shares the interval.
    /// A hit means the store failed to serialize inserts.
    async fn verify_exclusive(&self, reservation: &Reservation, now: DateTime<Utc>) -> CoreResult<()> {
        let overlapping = self
            .store
            .list_active_reservations(
                reservation.court_id,
                reservation.start_time,
                reservation.end_time,
            )
            .await?;

        let others: Vec<Uuid> = overlapping
            .iter()
            .filter(|r| r.id != reservation.id)
            .map(|r| r.id)
            .collect();
        if others.is_empty() {
            return Ok(());
        }

        error!(
            reservation_id = %reservation.id,
            court_id = %reservation.court_id,
            conflicting = ?others,
            "Overlapping active reservations after insert"
        );
        self.store
            .transition_reservation(
                reservation.id,
                &[ReservationStatus::Hold],
                ReservationStatus::Cancelled,
                Some("overlap detected after insert"),
                now,
            )
            .await?;

        Err(CoreError::InvariantViolation(format!(
            "reservation {} overlaps {:?} on court {}",
            reservation.id, others, reservation.court_id
        )))
    }

    async fn count_promo_use(&self, reservation: &Reservation) {
        let Some(code) = reservation.promo_code.as_deref() else {
            return;
        };
        let counted = match self.store.find_promo(code).await {
            Ok(Some(promo)) => self.store.increment_promo_use(promo.id).await,
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        };
        match counted {
            Ok(true) => {}
            Ok(false) => warn!(reservation_id = %reservation.id, %code, "Promo use not counted"),
            Err(e) => warn!(reservation_id = %reservation.id, %code, "Promo use failed: {}", e),
        }
    }
}
