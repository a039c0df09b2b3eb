use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use court_core::models::Reservation;
use court_core::CoreError;
use court_order::{CancellationReceipt, HoldRequest, Quote, ReservationDetails};
use uuid::Uuid;

use crate::{error::AppError, middleware::CurrentActor, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/quotes", post(quote))
        .route("/v1/reservations", post(create_hold).get(list_own))
        .route("/v1/reservations/{id}", get(get_reservation))
        .route("/v1/reservations/{id}/cancel", post(cancel))
}

/// POST /v1/quotes
async fn quote(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<HoldRequest>,
) -> Result<Json<Quote>, AppError> {
    Ok(Json(state.manager.quote(&actor, &req, Utc::now()).await?))
}

/// POST /v1/reservations
/// Place a HOLD on a slot
async fn create_hold(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<HoldRequest>,
) -> Result<(StatusCode, Json<Reservation>), AppError> {
    match state.manager.create_hold(&actor, &req, Utc::now()).await {
        Ok(hold) => {
            state.metrics.holds_created.inc();
            Ok((StatusCode::CREATED, Json(hold)))
        }
        Err(e @ CoreError::SlotConflict { .. }) => {
            state.metrics.slot_conflicts.inc();
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /v1/reservations
async fn list_own(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Vec<Reservation>>, AppError> {
    Ok(Json(state.manager.list_for(&actor).await?))
}

/// GET /v1/reservations/{id}
async fn get_reservation(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationDetails>, AppError> {
    Ok(Json(state.manager.get(&actor, id).await?))
}

/// POST /v1/reservations/{id}/cancel
async fn cancel(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<CancellationReceipt>, AppError> {
    Ok(Json(state.payments.cancel_reservation(&actor, id, Utc::now()).await?))
}
