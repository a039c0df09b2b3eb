use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use court_core::models::Court;
use court_order::CourtAvailability;
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    /// Venue-local date; today when absent.
    pub date: Option<NaiveDate>,
    pub court_id: Option<Uuid>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/courts", get(list_courts))
        .route("/v1/availability", get(availability))
}

/// GET /v1/courts
async fn list_courts(State(state): State<AppState>) -> Result<Json<Vec<Court>>, AppError> {
    Ok(Json(state.manager.courts().await?))
}

/// GET /v1/availability?date=YYYY-MM-DD&court_id=
async fn availability(
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Vec<CourtAvailability>>, AppError> {
    let now = Utc::now();
    let date = query
        .date
        .unwrap_or_else(|| state.manager.calculator().venue().local_date(now));

    let result = state.manager.availability(query.court_id, date, now).await?;
    Ok(Json(result))
}
