use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use court_core::models::{Payment, PaymentMethod, Reservation, Ticket};
use court_order::SettlementOutcome;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, middleware::CurrentActor, state::AppState, worker};

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub method: PaymentMethod,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualPaymentStatus {
    Confirmed,
    AlreadyConfirmed,
    Released,
}

#[derive(Debug, Serialize)]
pub struct ManualPaymentResponse {
    pub status: ManualPaymentStatus,
    pub reservation: Reservation,
    pub ticket: Option<Ticket>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/reservations/{id}/payments", post(request_payment))
        .route("/v1/reservations/{id}/payments/manual", post(confirm_manual))
}

/// POST /v1/reservations/{id}/payments
/// Start a gateway payment and poll it in the background
async fn request_payment(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Json(req): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    let payment = state
        .payments
        .request_payment(&actor, id, req.method, Utc::now())
        .await?;

    // A repeated request returns the payment whose poller is already running.
    worker::spawn_payment_poller(state.clone(), payment.id).await;

    Ok((StatusCode::ACCEPTED, Json(payment)))
}

/// POST /v1/reservations/{id}/payments/manual
async fn confirm_manual(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<ManualPaymentResponse>, AppError> {
    let outcome = state
        .payments
        .confirm_manual_payment(&actor, id, Utc::now())
        .await?;

    let response = match outcome {
        SettlementOutcome::Confirmed { reservation, ticket } => {
            state.metrics.payments_confirmed.inc();
            ManualPaymentResponse {
                status: ManualPaymentStatus::Confirmed,
                reservation,
                ticket: Some(ticket),
            }
        }
        SettlementOutcome::AlreadyConfirmed(reservation) => {
            let ticket = state.store.get_ticket_for_reservation(reservation.id).await.ok().flatten();
            ManualPaymentResponse {
                status: ManualPaymentStatus::AlreadyConfirmed,
                reservation,
                ticket,
            }
        }
        SettlementOutcome::Released(reservation) => ManualPaymentResponse {
            status: ManualPaymentStatus::Released,
            reservation,
            ticket: None,
        },
    };
    Ok(Json(response))
}
