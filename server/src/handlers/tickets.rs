use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::models::actor::Actor;
use crate::models::ticket::{NewTicketType, TicketTypeUpdate, TicketTypeView};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn list_ticket_types(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let types: Vec<TicketTypeView> = state
        .tickets
        .list_ticket_types(event_id)
        .await?
        .into_iter()
        .map(TicketTypeView::from)
        .collect();
    Ok(success(types, "Ticket types retrieved"))
}

pub async fn create_ticket_type(
    State(state): State<AppState>,
    actor: Actor,
    Path(event_id): Path<Uuid>,
    Json(payload): Json<NewTicketType>,
) -> Result<Response, AppError> {
    let ticket_type = state
        .tickets
        .create_ticket_type(&actor, event_id, payload)
        .await?;
    Ok(created(TicketTypeView::from(ticket_type), "Ticket type created"))
}

pub async fn get_ticket_type(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let ticket_type = state.tickets.get_ticket_type(id).await?;
    Ok(success(TicketTypeView::from(ticket_type), "Ticket type retrieved"))
}

pub async fn update_ticket_type(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<TicketTypeUpdate>,
) -> Result<Response, AppError> {
    let ticket_type = state.tickets.update_ticket_type(&actor, id, payload).await?;
    Ok(success(TicketTypeView::from(ticket_type), "Ticket type updated"))
}

pub async fn delete_ticket_type(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let removed_items = state.tickets.delete_ticket_type(&actor, id).await?;
    Ok(success(
        json!({ "id": id, "removedOrderItems": removed_items }),
        "Ticket type deleted",
    ))
}
