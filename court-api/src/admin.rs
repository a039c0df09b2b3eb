use axum::{
    extract::{Path, State},
    routing::patch,
    Json, Router,
};
use court_core::models::{Court, CourtUpdate};
use uuid::Uuid;

use crate::{error::AppError, middleware::CurrentActor, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/admin/courts/{id}", patch(update_court))
}

/// PATCH /v1/admin/courts/{id}
/// Edit rates or soft-(de)activate a court
async fn update_court(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(court_id): Path<Uuid>,
    Json(req): Json<CourtUpdate>,
) -> Result<Json<Court>, AppError> {
    Ok(Json(state.manager.update_court(&actor, court_id, &req).await?))
}
