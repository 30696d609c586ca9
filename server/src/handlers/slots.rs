use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use uuid::Uuid;

use crate::models::actor::Actor;
use crate::models::slot::{
    NewSlot, SlotCapacityUpdate, SlotReservationRequest, SlotStatusUpdate, SlotView,
};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn list_slots(
    State(state): State<AppState>,
    Path(activity_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let slots: Vec<SlotView> = state
        .slots
        .list_slots(activity_id)
        .await?
        .into_iter()
        .map(SlotView::from)
        .collect();
    Ok(success(slots, "Slots retrieved"))
}

pub async fn create_slot(
    State(state): State<AppState>,
    actor: Actor,
    Path(activity_id): Path<Uuid>,
    Json(payload): Json<NewSlot>,
) -> Result<Response, AppError> {
    let slot = state.slots.create_slot(&actor, activity_id, payload).await?;
    Ok(created(SlotView::from(slot), "Slot created"))
}

pub async fn set_slot_status(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<SlotStatusUpdate>,
) -> Result<Response, AppError> {
    let slot = state.slots.set_status(&actor, id, payload.status).await?;
    Ok(success(SlotView::from(slot), "Slot status updated"))
}

pub async fn update_slot_capacity(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<SlotCapacityUpdate>,
) -> Result<Response, AppError> {
    let slot = state
        .slots
        .update_capacity(&actor, id, payload.capacity_total)
        .await?;
    Ok(success(SlotView::from(slot), "Slot capacity updated"))
}

pub async fn reserve_slot(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<SlotReservationRequest>,
) -> Result<Response, AppError> {
    let slot = state.slots.reserve(id, payload.quantity).await?;
    Ok(success(SlotView::from(slot), "Slot places reserved"))
}
