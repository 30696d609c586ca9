use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::actor::Actor;
use crate::models::booking::{BookingAction, BookingView, NewBooking};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub action: BookingAction,
}

pub async fn create_booking(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<NewBooking>,
) -> Result<Response, AppError> {
    let booking = state.bookings.create_booking(&actor, payload).await?;
    Ok(created(BookingView::from(booking), "Booking requested"))
}

pub async fn get_booking(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let booking = state.bookings.get_booking(&actor, id).await?;
    Ok(success(BookingView::from(booking), "Booking retrieved"))
}

pub async fn transition_booking(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<Response, AppError> {
    let booking = state
        .bookings
        .transition(id, &actor, payload.action)
        .await?;
    let message = format!("Booking {}", booking.status);
    Ok(success(BookingView::from(booking), message))
}
