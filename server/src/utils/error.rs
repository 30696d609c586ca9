use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};

use crate::models::booking::TransitionViolation;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// `resource` is `"ticket_type"` or `"slot"`, `id` the row that ran out.
    #[error("Insufficient inventory for {resource} {id}: {remaining} remaining")]
    InsufficientInventory {
        resource: &'static str,
        id: uuid::Uuid,
        remaining: i32,
    },

    #[error("Illegal transition: {0}")]
    IllegalTransition(#[from] TransitionViolation),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    /// The order stays pending and can be retried.
    #[error("External service error: {message}")]
    ExternalServiceError {
        message: String,
        order_id: Option<uuid::Uuid>,
    },

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InsufficientInventory { .. } => StatusCode::CONFLICT,
            AppError::IllegalTransition(violation) => match violation.constraint() {
                "actor" => StatusCode::FORBIDDEN,
                _ => StatusCode::CONFLICT,
            },
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ExternalServiceError { .. } => StatusCode::BAD_GATEWAY,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::InsufficientInventory { .. } => "INSUFFICIENT_INVENTORY",
            AppError::IllegalTransition(_) => "ILLEGAL_TRANSITION",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::ExternalServiceError { .. } => "EXTERNAL_SERVICE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Message safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::InsufficientInventory { remaining, .. } if *remaining > 0 => {
                format!("Only {} left", remaining)
            }
            AppError::InsufficientInventory { .. } => "Sold out".to_string(),
            AppError::IllegalTransition(violation) => violation.to_string(),
            AppError::ExternalServiceError { .. } => {
                "The payment provider could not be reached, please retry".to_string()
            }
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::InsufficientInventory {
                resource,
                id,
                remaining,
            } => Some(json!({ "resource": resource, "id": id, "remaining": remaining })),
            AppError::IllegalTransition(violation) => {
                let mut details = json!({ "constraint": violation.constraint() });
                match violation {
                    TransitionViolation::WrongActor { role, action } => {
                        details["role"] = json!(role);
                        details["action"] = json!(action);
                    }
                    TransitionViolation::NotParty { role } => {
                        details["role"] = json!(role);
                    }
                    TransitionViolation::WrongState { from, action } => {
                        details["status"] = json!(from);
                        details["action"] = json!(action);
                    }
                }
                Some(details)
            }
            AppError::ExternalServiceError {
                order_id: Some(order_id),
                ..
            } => Some(json!({ "orderId": order_id, "retryable": true })),
            _ => None,
        }
    }

    fn log(&self) {
        match self {
            AppError::ValidationError(_)
            | AppError::AuthError(_)
            | AppError::Forbidden(_)
            | AppError::NotFound(_)
            | AppError::Conflict(_)
            | AppError::InsufficientInventory { .. }
            | AppError::IllegalTransition(_) => {
                warn!(code = self.code(), error = %self, "Request rejected");
            }
            AppError::ExternalServiceError { message, order_id } => {
                error!(message = %message, order_id = ?order_id, "External service error");
            }
            AppError::InternalServerError(msg) => {
                error!(message = %msg, "Internal error");
            }
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        error_response(code, self.public_message(), self.details(), status)
    }
}
