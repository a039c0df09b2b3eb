use chrono::{DateTime, Utc};
use court_catalog::Venue;
use court_core::models::{
    Court, Customer, Reservation, ReservationStatus, Ticket, TicketStatus,
};
use court_core::{
    Actor, BookingStore, Capability, CoreError, CoreResult, EventSink, StoreError,
};
use court_shared::BookingEvent;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::policy::BookingPolicy;

/// No 0/O, 1/I/L: credentials are read aloud and typed at the desk.
const CREDENTIAL_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CREDENTIAL_RANDOM_LEN: usize = 10;
const ISSUE_ATTEMPTS: usize = 3;

/// What the guard sees after a successful scan.
#[derive(Debug, Clone, Serialize)]
pub struct RedemptionReceipt {
    pub ticket: Ticket,
    pub reservation: Reservation,
    pub court: Court,
    pub customer: Option<Customer>,
}

/// Issues one credential per confirmed reservation and consumes it once at check-in.
#[derive(Clone)]
pub struct TicketService {
    store: Arc<dyn BookingStore>,
    venue: Venue,
    policy: BookingPolicy,
    events: Arc<dyn EventSink>,
}

impl TicketService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        venue: Venue,
        policy: BookingPolicy,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self { store, venue, policy, events }
    }

    pub async fn issue(&self, reservation: &Reservation, now: DateTime<Utc>) -> CoreResult<Ticket> {
        if reservation.status != ReservationStatus::Confirmed {
            return Err(CoreError::InvalidState(format!(
                "tickets are issued for CONFIRMED reservations, {} is {}",
                reservation.id, reservation.status
            )));
        }
        if self.store.get_ticket_for_reservation(reservation.id).await?.is_some() {
            return Err(CoreError::InvalidState(format!(
                "reservation {} already has a ticket",
                reservation.id
            )));
        }

        let court = self
            .store
            .get_court(reservation.court_id)
            .await?
            .ok_or_else(|| CoreError::not_found("court", reservation.court_id))?;

        for _ in 0..ISSUE_ATTEMPTS {
            let credential = self.generate_credential(&court, reservation);
            let ticket = Ticket {
                id: Uuid::new_v4(),
                reservation_id: reservation.id,
                payload: self.generate_payload(&credential, reservation, &court),
                credential,
                status: TicketStatus::Active,
                used_at: None,
                redeemed_by: None,
                created_at: now,
            };

            match self.store.insert_ticket(&ticket).await {
                Ok(()) => {
                    info!(reservation_id = %reservation.id, ticket_id = %ticket.id, "Ticket issued");
                    return Ok(ticket);
                }
                Err(StoreError::Conflict(msg)) => {
                    // Either a concurrent issue won, or the random part collided.
                    if self.store.get_ticket_for_reservation(reservation.id).await?.is_some() {
                        return Err(CoreError::InvalidState(msg));
                    }
                    warn!(reservation_id = %reservation.id, "Credential collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CoreError::InvariantViolation(format!(
            "could not generate a unique credential for reservation {}",
            reservation.id
        )))
    }

    /// Ticket of a reservation, for its owner or staff.
    pub async fn ticket_for(&self, actor: &Actor, reservation_id: Uuid) -> CoreResult<Ticket> {
        let reservation = self
            .store
            .get_reservation(reservation_id)
            .await?
            .ok_or_else(|| CoreError::not_found("reservation", reservation_id))?;
        actor.require_owner_or_staff(&reservation.customer_id)?;

        self.store
            .get_ticket_for_reservation(reservation_id)
            .await?
            .ok_or_else(|| CoreError::not_found("ticket", reservation_id))
    }

    /// Consume a credential at the gate. Exactly one concurrent scan succeeds.
    pub async fn redeem(
        &self,
        actor: &Actor,
        credential: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<RedemptionReceipt> {
        actor.require(Capability::RedeemTicket)?;

        let credential = credential.trim();
        let ticket = self
            .store
            .get_ticket_by_credential(credential)
            .await?
            .ok_or_else(|| CoreError::not_found("ticket", credential))?;
        ensure_redeemable(&ticket)?;

        let reservation = self
            .store
            .get_reservation(ticket.reservation_id)
            .await?
            .ok_or_else(|| CoreError::not_found("reservation", ticket.reservation_id))?;
        if reservation.status != ReservationStatus::Confirmed {
            return Err(CoreError::InvalidState(format!(
                "reservation {} is {}",
                reservation.id, reservation.status
            )));
        }

        let (opens_at, closes_at) = self.policy.checkin_window(reservation.start_time);
        if now < opens_at || now > closes_at {
            return Err(CoreError::OutsideWindow { opens_at, closes_at });
        }

        let ticket = match self.store.mark_ticket_used(ticket.id, now, &actor.id).await? {
            Some(ticket) => ticket,
            None => {
                // Lost the race: report what the winner left behind.
                let current = self
                    .store
                    .get_ticket_by_credential(credential)
                    .await?
                    .ok_or_else(|| CoreError::not_found("ticket", credential))?;
                ensure_redeemable(&current)?;
                return Err(CoreError::InvalidState(format!(
                    "ticket {} changed during redemption",
                    current.id
                )));
            }
        };

        info!(
            reservation_id = %reservation.id,
            redeemed_by = %actor.id,
            "Ticket redeemed"
        );
        self.events
            .publish(BookingEvent::TicketRedeemed {
                reservation_id: reservation.id,
                credential: ticket.credential.clone(),
                redeemed_by: actor.id.clone(),
                timestamp: now.timestamp(),
            })
            .await;

        let court = self
            .store
            .get_court(reservation.court_id)
            .await?
            .ok_or_else(|| CoreError::not_found("court", reservation.court_id))?;
        let customer = self.store.get_customer(&reservation.customer_id).await?;

        Ok(RedemptionReceipt { ticket, reservation, court, customer })
    }

    /// `TNS-{local date}-C{court code}-{random}`.
    fn generate_credential(&self, court: &Court, reservation: &Reservation) -> String {
        let mut rng = rand::thread_rng();
        let random: String = (0..CREDENTIAL_RANDOM_LEN)
            .map(|_| CREDENTIAL_ALPHABET[rng.gen_range(0..CREDENTIAL_ALPHABET.len())] as char)
            .collect();

        format!(
            "TNS-{}-C{}-{}",
            self.venue.local_date(reservation.start_time).format("%Y%m%d"),
            court.short_code(),
            random
        )
    }

    /// JSON handed to the QR/PDF renderer.
    fn generate_payload(&self, credential: &str, reservation: &Reservation, court: &Court) -> String {
        serde_json::json!({
            "credential": credential,
            "reservation_id": reservation.id,
            "court": court.name,
            "start": self.venue.local(reservation.start_time).to_rfc3339(),
            "end": self.venue.local(reservation.end_time).to_rfc3339(),
            "amount": reservation.pricing.final_amount,
        })
        .to_string()
    }
}

fn ensure_redeemable(ticket: &Ticket) -> CoreResult<()> {
    match ticket.status {
        TicketStatus::Active => Ok(()),
        TicketStatus::Used => Err(CoreError::AlreadyUsed {
            used_at: ticket.used_at.unwrap_or(ticket.created_at),
        }),
        other => Err(CoreError::InvalidState(format!("ticket is {}", other))),
    }
}
