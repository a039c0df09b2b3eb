use async_trait::async_trait;
use chrono::{DateTime, Utc};
use court_core::models::{
    Payment, PaymentMethod, PaymentPatch, PaymentStatus, Reservation, ReservationStatus,
};
use court_core::payment::{GatewayError, GatewayStatus, PaymentGateway, PaymentInitiation};
use court_core::{Actor, BookingStore, Capability, CoreError, CoreResult, StoreError};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::manager::{Cancellation, ReservationManager, SettlementOutcome};
use crate::policy::{RefundDecision, RefundKind};
use crate::retry::RetryPolicy;

/// State of a payment after one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Pending,
    Confirmed(Reservation),
    Failed(String),
    /// Captured after the reservation was released, and returned to the payer.
    Refunded,
    /// Someone else already moved the payment to a terminal status.
    AlreadySettled(PaymentStatus),
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundOutcome {
    pub decision: RefundDecision,
    pub payment: Payment,
    /// False when the provider refused or failed; staff must settle it by hand.
    pub executed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationReceipt {
    pub reservation: Reservation,
    pub refund: Option<RefundOutcome>,
}

/// Drives payments between the reservation state machine and the registered gateways.
pub struct PaymentOrchestrator {
    store: Arc<dyn BookingStore>,
    manager: Arc<ReservationManager>,
    gateways: HashMap<PaymentMethod, Arc<dyn PaymentGateway>>,
    retry: RetryPolicy,
    manual_mode: bool,
}

impl PaymentOrchestrator {
    pub fn new(
        store: Arc<dyn BookingStore>,
        manager: Arc<ReservationManager>,
        retry: RetryPolicy,
        manual_mode: bool,
    ) -> Self {
        Self {
            store,
            manager,
            gateways: HashMap::new(),
            retry,
            manual_mode,
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.method(), gateway);
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn manager(&self) -> &Arc<ReservationManager> {
        &self.manager
    }

    /// Start paying a hold through a gateway. A repeated request with the same method
    /// returns the payment already in flight.
    pub async fn request_payment(
        &self,
        actor: &Actor,
        reservation_id: Uuid,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> CoreResult<Payment> {
        let reservation = self.reservation(reservation_id).await?;
        actor.require_owner_or_staff(&reservation.customer_id)?;
        ensure_payable(&reservation, now)?;

        if let Some(existing) = self.store.get_payment_for_reservation(reservation_id).await? {
            return reuse_payment(existing, method);
        }

        if method == PaymentMethod::Cash {
            return Err(CoreError::Validation(
                "cash payments are confirmed manually".to_string(),
            ));
        }
        let gateway = self.gateway(method)?;

        let payment = Payment::new(
            reservation_id,
            reservation.customer_id.clone(),
            method,
            reservation.pricing.final_amount,
            now,
        );
        match self.store.insert_payment(&payment).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                let existing = self
                    .store
                    .get_payment_for_reservation(reservation_id)
                    .await?
                    .ok_or_else(|| CoreError::not_found("payment", reservation_id))?;
                return reuse_payment(existing, method);
            }
            Err(e) => return Err(e.into()),
        }

        let initiation = match gateway.initiate(payment.amount, reservation_id).await {
            Ok(initiation) => initiation,
            Err(e) => return Err(self.abandon_initiation(&payment, e, now).await),
        };

        let updated = self
            .store
            .transition_payment(
                payment.id,
                &[PaymentStatus::Pending],
                PaymentStatus::Processing,
                PaymentPatch {
                    external_ref: Some(initiation.external_ref.clone()),
                    payment_url: initiation.payment_url.clone(),
                    ..PaymentPatch::default()
                },
                now,
            )
            .await?
            .ok_or_else(|| {
                CoreError::InvalidState(format!("payment {} changed during initiation", payment.id))
            })?;

        info!(
            %reservation_id,
            payment_id = %updated.id,
            method = %method,
            external_ref = %initiation.external_ref,
            "Payment initiated"
        );
        Ok(updated)
    }

    /// Record a cash payment as received and confirm the reservation.
    ///
    /// In manual payment mode the customer may confirm their own hold; otherwise only staff
    /// with [`Capability::ConfirmManualPayment`] can.
    pub async fn confirm_manual_payment(
        &self,
        actor: &Actor,
        reservation_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<SettlementOutcome> {
        let reservation = self.reservation(reservation_id).await?;
        if self.manual_mode && actor.id == reservation.customer_id {
            actor.require(Capability::ManageOwnReservations)?;
        } else {
            actor.require(Capability::ConfirmManualPayment)?;
        }

        match reservation.status {
            ReservationStatus::Paid => {}
            ReservationStatus::Confirmed => {
                let paid = self
                    .store
                    .get_payment_for_reservation(reservation_id)
                    .await?
                    .is_some_and(|p| p.status == PaymentStatus::Paid);
                if paid {
                    return Ok(SettlementOutcome::AlreadyConfirmed(reservation));
                }
                ensure_payable(&reservation, now)?;
            }
            _ => ensure_payable(&reservation, now)?,
        }

        let payment = match self.store.get_payment_for_reservation(reservation_id).await? {
            Some(existing) if existing.method == PaymentMethod::Cash => existing,
            Some(existing) if existing.status == PaymentStatus::Paid => existing,
            Some(existing) => {
                return Err(CoreError::InvalidState(format!(
                    "payment {} via {} is already {}",
                    existing.id, existing.method, existing.status
                )))
            }
            None => {
                let cash = Payment::new(
                    reservation_id,
                    reservation.customer_id.clone(),
                    PaymentMethod::Cash,
                    reservation.pricing.final_amount,
                    now,
                );
                match self.store.insert_payment(&cash).await {
                    Ok(()) => cash,
                    Err(StoreError::Conflict(_)) => self
                        .store
                        .get_payment_for_reservation(reservation_id)
                        .await?
                        .ok_or_else(|| CoreError::not_found("payment", reservation_id))?,
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let recorded = if PaymentStatus::OPEN.contains(&payment.status) {
            self.store
                .transition_payment(
                    payment.id,
                    &PaymentStatus::OPEN,
                    PaymentStatus::Paid,
                    PaymentPatch { paid_at: Some(now), ..PaymentPatch::default() },
                    now,
                )
                .await?
        } else {
            None
        };
        if recorded.is_some() {
            info!(%reservation_id, confirmed_by = %actor.id, "Manual payment recorded");
        }

        let outcome = self.manager.apply_payment_success(reservation_id, now).await?;

        // A cancel that read the payment before it was recorded left the money with us.
        if let (SettlementOutcome::Released(_), Some(paid)) = (&outcome, recorded) {
            warn!(%reservation_id, payment_id = %paid.id, "Refunding cash recorded after cancellation");
            let decision = RefundDecision { kind: RefundKind::Full, amount: paid.amount };
            self.execute_refund(paid, decision, now).await?;
        }
        Ok(outcome)
    }

    /// Ask the provider once and apply a terminal answer.
    pub async fn poll_once(&self, payment_id: Uuid, now: DateTime<Utc>) -> CoreResult<PollOutcome> {
        let payment = self.payment(payment_id).await?;
        if payment.status.is_terminal() {
            return Ok(PollOutcome::AlreadySettled(payment.status));
        }
        let Some(external_ref) = payment.external_ref.clone() else {
            return Ok(PollOutcome::Pending);
        };
        let gateway = self.gateway(payment.method)?;

        let attempt = self.store.record_poll_attempt(payment_id).await?;
        match gateway.poll(&external_ref).await {
            Ok(GatewayStatus::Paid) => self.settle_paid(&payment, now).await,
            Ok(GatewayStatus::Cancelled) => {
                self.settle_failed(&payment, "payment cancelled by provider", now).await
            }
            Ok(GatewayStatus::Pending) | Ok(GatewayStatus::NotFound) => Ok(PollOutcome::Pending),
            Err(GatewayError::Timeout) => {
                warn!(%payment_id, attempt, "Payment provider timed out; still pending");
                Ok(PollOutcome::Pending)
            }
            Err(GatewayError::Declined(reason)) => {
                self.settle_failed(&payment, &format!("payment declined: {}", reason), now).await
            }
            Err(GatewayError::Provider(reason)) => {
                warn!(%payment_id, attempt, "Payment provider error: {}", reason);
                Ok(PollOutcome::Pending)
            }
        }
    }

    /// Poll with exponential backoff until the payment settles or the attempt budget runs out.
    /// Exhaustion fails the payment and cancels the hold with a terminal `PaymentError`.
    pub async fn poll_until_settled(&self, payment_id: Uuid) -> CoreResult<PollOutcome> {
        let mut attempts = self.payment(payment_id).await?.poll_attempts.max(0) as usize;

        while self.retry.allows(attempts) {
            tokio::time::sleep(self.retry.delay_for_attempt(attempts)).await;
            match self.poll_once(payment_id, Utc::now()).await? {
                PollOutcome::Pending => attempts += 1,
                settled => return Ok(settled),
            }
        }

        let reason = format!("payment not confirmed after {} polls", attempts);
        error!(%payment_id, "{}", reason);
        let payment = self.payment(payment_id).await?;
        match self.settle_failed(&payment, &reason, Utc::now()).await? {
            PollOutcome::AlreadySettled(status) => Ok(PollOutcome::AlreadySettled(status)),
            _ => Err(CoreError::PaymentError(reason)),
        }
    }

    /// Cancel a reservation and pay back whatever the refund policy owes.
    pub async fn cancel_reservation(
        &self,
        actor: &Actor,
        reservation_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<CancellationReceipt> {
        let Cancellation { reservation, refund } =
            self.manager.cancel(actor, reservation_id, now).await?;

        let refund = match refund {
            Some(pending) => Some(self.execute_refund(pending.payment, pending.decision, now).await?),
            None => None,
        };
        Ok(CancellationReceipt { reservation, refund })
    }

    async fn settle_paid(&self, payment: &Payment, now: DateTime<Utc>) -> CoreResult<PollOutcome> {
        let paid = self
            .store
            .transition_payment(
                payment.id,
                &PaymentStatus::OPEN,
                PaymentStatus::Paid,
                PaymentPatch { paid_at: Some(now), ..PaymentPatch::default() },
                now,
            )
            .await?;
        let Some(paid) = paid else {
            let current = self.payment(payment.id).await?;
            return Ok(PollOutcome::AlreadySettled(current.status));
        };

        match self.manager.apply_payment_success(paid.reservation_id, now).await? {
            SettlementOutcome::Confirmed { reservation, .. }
            | SettlementOutcome::AlreadyConfirmed(reservation) => {
                Ok(PollOutcome::Confirmed(reservation))
            }
            SettlementOutcome::Released(reservation) => {
                warn!(
                    reservation_id = %reservation.id,
                    payment_id = %paid.id,
                    "Refunding payment captured after the hold was released"
                );
                let decision = RefundDecision { kind: RefundKind::Full, amount: paid.amount };
                let outcome = self.execute_refund(paid, decision, now).await?;
                if outcome.executed {
                    Ok(PollOutcome::Refunded)
                } else {
                    Ok(PollOutcome::AlreadySettled(PaymentStatus::Paid))
                }
            }
        }
    }

    async fn settle_failed(
        &self,
        payment: &Payment,
        reason: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<PollOutcome> {
        let failed = self
            .store
            .transition_payment(
                payment.id,
                &PaymentStatus::OPEN,
                PaymentStatus::Failed,
                PaymentPatch { error_message: Some(reason.to_string()), ..PaymentPatch::default() },
                now,
            )
            .await?;
        if failed.is_none() {
            let current = self.payment(payment.id).await?;
            return Ok(PollOutcome::AlreadySettled(current.status));
        }

        self.manager
            .apply_payment_failure(payment.reservation_id, reason, now)
            .await?;
        Ok(PollOutcome::Failed(reason.to_string()))
    }

    /// The gateway refused to start: fail the payment and release the hold.
    async fn abandon_initiation(&self, payment: &Payment, err: GatewayError, now: DateTime<Utc>) -> CoreError {
        let reason = err.to_string();
        error!(reservation_id = %payment.reservation_id, "Payment initiation failed: {}", reason);

        let released = async {
            self.store
                .transition_payment(
                    payment.id,
                    &PaymentStatus::OPEN,
                    PaymentStatus::Failed,
                    PaymentPatch { error_message: Some(reason.clone()), ..PaymentPatch::default() },
                    now,
                )
                .await?;
            self.manager
                .apply_payment_failure(payment.reservation_id, &reason, now)
                .await?;
            Ok::<(), CoreError>(())
        }
        .await;
        if let Err(e) = released {
            return e;
        }

        match err {
            GatewayError::Declined(msg) => CoreError::PaymentDeclined(msg),
            other => CoreError::PaymentError(other.to_string()),
        }
    }

    async fn execute_refund(
        &self,
        payment: Payment,
        decision: RefundDecision,
        now: DateTime<Utc>,
    ) -> CoreResult<RefundOutcome> {
        if decision.amount <= Decimal::ZERO {
            return Ok(RefundOutcome { decision, payment, executed: true });
        }

        let executed = match (self.gateways.get(&payment.method), payment.external_ref.as_deref()) {
            (Some(gateway), Some(external_ref)) => {
                match gateway.refund(external_ref, decision.amount).await {
                    Ok(true) => true,
                    Ok(false) => {
                        error!(payment_id = %payment.id, "Provider refused refund");
                        false
                    }
                    Err(e) => {
                        error!(payment_id = %payment.id, "Refund failed: {}", e);
                        false
                    }
                }
            }
            // Cash goes back over the desk.
            _ => {
                info!(payment_id = %payment.id, amount = %decision.amount, "Manual refund due");
                true
            }
        };

        if !executed {
            return Ok(RefundOutcome { decision, payment, executed });
        }

        let refunded = self
            .store
            .transition_payment(
                payment.id,
                &[PaymentStatus::Paid],
                PaymentStatus::Refunded,
                PaymentPatch {
                    refunded_amount: Some(decision.amount),
                    ..PaymentPatch::default()
                },
                now,
            )
            .await?
            .unwrap_or(payment);

        info!(
            payment_id = %refunded.id,
            amount = %decision.amount,
            kind = ?decision.kind,
            "Payment refunded"
        );
        Ok(RefundOutcome { decision, payment: refunded, executed })
    }

    fn gateway(&self, method: PaymentMethod) -> CoreResult<Arc<dyn PaymentGateway>> {
        self.gateways.get(&method).cloned().ok_or_else(|| {
            CoreError::Validation(format!("payment method '{}' is not available", method))
        })
    }

    async fn reservation(&self, id: Uuid) -> CoreResult<Reservation> {
        self.store
            .get_reservation(id)
            .await?
            .ok_or_else(|| CoreError::not_found("reservation", id))
    }

    async fn payment(&self, id: Uuid) -> CoreResult<Payment> {
        self.store
            .get_payment(id)
            .await?
            .ok_or_else(|| CoreError::not_found("payment", id))
    }
}

fn ensure_payable(reservation: &Reservation, now: DateTime<Utc>) -> CoreResult<()> {
    if reservation.status != ReservationStatus::Hold {
        return Err(CoreError::InvalidState(format!(
            "reservation {} is {}, only HOLD can be paid",
            reservation.id, reservation.status
        )));
    }
    if reservation.is_hold_expired(now) {
        return Err(CoreError::ExpiredHold {
            expired_at: reservation.hold_expires_at.unwrap_or(now),
        });
    }
    Ok(())
}

fn reuse_payment(existing: Payment, method: PaymentMethod) -> CoreResult<Payment> {
    if PaymentStatus::OPEN.contains(&existing.status) && existing.method == method {
        Ok(existing)
    } else {
        Err(CoreError::InvalidState(format!(
            "reservation already has a {} payment via {}",
            existing.status, existing.method
        )))
    }
}

/// Scriptable gateway for tests and local runs.
///
/// `poll` replays queued answers in order and then keeps answering `Pending`.
pub struct MockPaymentGateway {
    method: PaymentMethod,
    polls: Mutex<VecDeque<Result<GatewayStatus, GatewayError>>>,
    initiate_error: Mutex<Option<GatewayError>>,
    refunds: Mutex<Vec<(String, Decimal)>>,
    refuse_refunds: bool,
}

impl MockPaymentGateway {
    pub fn new(method: PaymentMethod) -> Self {
        Self {
            method,
            polls: Mutex::new(VecDeque::new()),
            initiate_error: Mutex::new(None),
            refunds: Mutex::new(Vec::new()),
            refuse_refunds: false,
        }
    }

    pub fn refusing_refunds(mut self) -> Self {
        self.refuse_refunds = true;
        self
    }

    pub async fn push_poll(&self, answer: Result<GatewayStatus, GatewayError>) {
        self.polls.lock().await.push_back(answer);
    }

    pub async fn fail_next_initiate(&self, err: GatewayError) {
        *self.initiate_error.lock().await = Some(err);
    }

    pub async fn refunds(&self) -> Vec<(String, Decimal)> {
        self.refunds.lock().await.clone()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    async fn initiate(
        &self,
        _amount: Decimal,
        reservation_id: Uuid,
    ) -> Result<PaymentInitiation, GatewayError> {
        if let Some(err) = self.initiate_error.lock().await.take() {
            return Err(err);
        }
        let external_ref = format!("mock_{}_{}", self.method, reservation_id.simple());
        Ok(PaymentInitiation {
            payment_url: Some(format!("https://pay.example.test/{}", external_ref)),
            external_ref,
            status: GatewayStatus::Pending,
        })
    }

    async fn poll(&self, _external_ref: &str) -> Result<GatewayStatus, GatewayError> {
        self.polls
            .lock()
            .await
            .pop_front()
            .unwrap_or(Ok(GatewayStatus::Pending))
    }

    async fn refund(&self, external_ref: &str, amount: Decimal) -> Result<bool, GatewayError> {
        if self.refuse_refunds {
            return Ok(false);
        }
        self.refunds.lock().await.push((external_ref.to_string(), amount));
        Ok(true)
    }
}
