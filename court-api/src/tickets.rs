use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use court_core::models::Ticket;
use court_order::RedemptionReceipt;
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::AppError, middleware::CurrentActor, state::AppState};

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub credential: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/reservations/{id}/ticket", get(get_ticket))
        .route("/v1/tickets/redeem", post(redeem))
}

/// GET /v1/reservations/{id}/ticket
/// Credential plus the JSON payload the renderer turns into a QR code
async fn get_ticket(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Ticket>, AppError> {
    Ok(Json(state.manager.tickets().ticket_for(&actor, id).await?))
}

/// POST /v1/tickets/redeem
async fn redeem(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<RedeemRequest>,
) -> Result<Json<RedemptionReceipt>, AppError> {
    let receipt = state
        .manager
        .tickets()
        .redeem(&actor, &req.credential, Utc::now())
        .await?;
    state.metrics.tickets_redeemed.inc();
    Ok(Json(receipt))
}
