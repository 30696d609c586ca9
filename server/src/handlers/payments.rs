use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::payments::stripe::{parse_webhook_event, verify_webhook_signature, WebhookEvent};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub session_id: String,
}

/// Landing page for buyers returning from hosted checkout.
pub async fn checkout_success(
    State(state): State<AppState>,
    Query(query): Query<SuccessQuery>,
) -> Result<Response, AppError> {
    let order = state
        .checkout
        .confirm_from_redirect(&query.session_id)
        .await?;
    Ok(success(order, "Order status refreshed"))
}

/// POST /payments/webhook
///
/// Returns 200 for anything that should not be redelivered, 5xx when the
/// processor should retry.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(secret) = state.webhook_secret.as_deref() else {
        warn!("Webhook received but no webhook secret is configured");
        return StatusCode::SERVICE_UNAVAILABLE;
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let now = chrono::Utc::now().timestamp();
    if let Err(reason) = verify_webhook_signature(&body, signature, secret, now) {
        warn!(reason, "Webhook signature rejected");
        return StatusCode::BAD_REQUEST;
    }

    let event = match parse_webhook_event(&body) {
        Ok(event) => event,
        Err(reason) => {
            warn!(reason, "Webhook payload rejected");
            return StatusCode::BAD_REQUEST;
        }
    };

    match event {
        WebhookEvent::SessionCompleted {
            event_id,
            session_id,
            paid: true,
        } => match state.checkout.confirm_order(&session_id).await {
            Ok(order_id) => {
                info!(event_id = %event_id, order_id = %order_id, "Webhook confirmed order");
                StatusCode::OK
            }
            // Retrying will not help; the order needs manual attention.
            Err(AppError::Conflict(_))
            | Err(AppError::InsufficientInventory { .. })
            | Err(AppError::NotFound(_)) => StatusCode::OK,
            Err(e) => {
                error!(event_id = %event_id, error = %e, "Webhook confirmation failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        WebhookEvent::SessionCompleted {
            event_id,
            session_id,
            paid: false,
        } => {
            info!(
                event_id = %event_id,
                session_id = %session_id,
                "Session completed without payment yet"
            );
            StatusCode::OK
        }
        WebhookEvent::SessionExpired {
            event_id,
            session_id,
        } => match state.checkout.cancel_by_session(&session_id).await {
            Ok(_) => {
                info!(event_id = %event_id, session_id = %session_id, "Expired session handled");
                StatusCode::OK
            }
            Err(AppError::Conflict(_)) => StatusCode::OK,
            Err(e) => {
                error!(event_id = %event_id, error = %e, "Expired session handling failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        WebhookEvent::Ignored { event_type } => {
            info!(event_type = %event_type, "Webhook event ignored");
            StatusCode::OK
        }
    }
}
