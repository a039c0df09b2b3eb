use chrono::Utc;
use court_core::CoreResult;
use court_order::PollOutcome;
use std::collections::HashSet;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::state::AppState;

/// Payments with a poller running in this process.
#[derive(Default)]
pub struct PollerSet {
    active: Mutex<HashSet<Uuid>>,
}

impl PollerSet {
    async fn claim(&self, payment_id: Uuid) -> bool {
        self.active.lock().await.insert(payment_id)
    }

    async fn release(&self, payment_id: Uuid) {
        self.active.lock().await.remove(&payment_id);
    }

    pub async fn is_polling(&self, payment_id: Uuid) -> bool {
        self.active.lock().await.contains(&payment_id)
    }
}

/// Cancel expired holds, then finish confirmations interrupted between capture and ticket issue.
pub async fn sweep_once(state: &AppState) -> CoreResult<()> {
    let now = Utc::now();
    let released = state.manager.release_expired_holds(now).await?;
    if !released.is_empty() {
        state.metrics.holds_expired.inc_by(released.len() as u64);
        info!("Expiry sweep released {} holds", released.len());
    }

    let repaired = state.manager.reconcile(now).await?;
    if repaired > 0 {
        warn!("Reconciled {} interrupted confirmations", repaired);
    }
    Ok(())
}

pub fn start_expiry_sweeper(state: AppState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Expiry sweeper started, every {:?}", every);
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = sweep_once(&state).await {
                error!("Expiry sweep failed: {}", e);
            }
        }
    })
}

pub fn start_settlement_sweeper(state: AppState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Settlement sweeper started, every {:?}", every);
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match state.manager.settle_finished(Utc::now()).await {
                Ok(settled) if !settled.is_empty() => {
                    info!("Settled {} finished reservations", settled.len())
                }
                Ok(_) => {}
                Err(e) => error!("Settlement sweep failed: {}", e),
            }
        }
    })
}

/// Poll one payment to a terminal state in the background. Returns `false` when a poller
/// for this payment is already running here.
pub async fn spawn_payment_poller(state: AppState, payment_id: Uuid) -> bool {
    if !state.pollers.claim(payment_id).await {
        return false;
    }

    tokio::spawn(async move {
        match state.payments.poll_until_settled(payment_id).await {
            Ok(PollOutcome::Confirmed(reservation)) => {
                state.metrics.payments_confirmed.inc();
                info!(%payment_id, reservation_id = %reservation.id, "Payment confirmed reservation");
            }
            Ok(outcome) => info!(%payment_id, ?outcome, "Payment polling finished"),
            Err(e) => error!(%payment_id, "Payment polling failed: {}", e),
        }
        state.pollers.release(payment_id).await;
    });
    true
}

/// Restart pollers for payments left open by a previous process.
pub async fn resume_payment_pollers(state: &AppState) -> CoreResult<usize> {
    let open = state.store.list_open_payments().await?;
    let mut resumed = 0;
    for payment in open.into_iter().filter(|p| p.external_ref.is_some()) {
        if spawn_payment_poller(state.clone(), payment.id).await {
            resumed += 1;
        }
    }
    if resumed > 0 {
        info!("Resumed {} payment pollers", resumed);
    }
    Ok(resumed)
}
