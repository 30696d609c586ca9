use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::actor::Actor;
use crate::models::availability::AvailabilityUpdate;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

pub async fn get_availability(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
    Query(range): Query<RangeQuery>,
) -> Result<Response, AppError> {
    let days = state
        .availability
        .get(provider_id, range.from, range.to)
        .await?;
    Ok(success(days, "Availability retrieved"))
}

pub async fn set_availability(
    State(state): State<AppState>,
    actor: Actor,
    Path((provider_id, date)): Path<(Uuid, NaiveDate)>,
    Json(payload): Json<AvailabilityUpdate>,
) -> Result<Response, AppError> {
    let day = state
        .availability
        .set_availability(&actor, provider_id, date, payload)
        .await?;
    Ok(success(day, "Availability updated"))
}

pub async fn clear_availability(
    State(state): State<AppState>,
    actor: Actor,
    Path((provider_id, date)): Path<(Uuid, NaiveDate)>,
) -> Result<Response, AppError> {
    let day = state
        .availability
        .clear(&actor, provider_id, date)
        .await?;
    Ok(success(day, "Availability cleared"))
}
