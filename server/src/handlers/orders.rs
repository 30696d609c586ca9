use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use uuid::Uuid;

use crate::models::order::{CheckoutRequest, OrderStatus};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn create_order(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Response, AppError> {
    let receipt = state.checkout.create_order(event_id, payload).await?;
    let message = match receipt.status {
        OrderStatus::Paid => "Order placed",
        _ => "Order created, awaiting payment",
    };
    Ok(created(receipt, message))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let order = state.checkout.get_order(id).await?;
    Ok(success(order, "Order retrieved"))
}

pub async fn retry_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let receipt = state.checkout.retry_payment(id).await?;
    Ok(success(receipt, "Payment session ready"))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let order = state.checkout.cancel_order(id).await?;
    Ok(success(order, "Order canceled"))
}
