use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::error::AppError;

/// A purchasable admission category for one event.
///
/// `price` is in minor currency units. `sold` is only ever moved by the
/// reservation step of checkout.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TicketType {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub price: i64,
    pub currency: String,
    pub total: i32,
    pub sold: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketType {
    pub fn remaining(&self) -> i32 {
        self.total - self.sold
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicketType {
    pub name: String,
    pub price: i64,
    pub currency: String,
    pub total: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketTypeUpdate {
    pub name: Option<String>,
    pub price: Option<i64>,
    pub total: Option<i32>,
}

/// Ticket type as shown to buyers and owners.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketTypeView {
    #[serde(flatten)]
    pub ticket_type: TicketType,
    pub remaining: i32,
}

impl From<TicketType> for TicketTypeView {
    fn from(ticket_type: TicketType) -> Self {
        let remaining = ticket_type.remaining();
        Self {
            ticket_type,
            remaining,
        }
    }
}

/// One line of an inventory reservation against a ticket type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationLine {
    pub ticket_type_id: Uuid,
    pub quantity: i32,
}

/// Validates and upper-cases an ISO 4217 style currency code.
pub fn normalize_currency(code: &str) -> Result<String, AppError> {
    let code = code.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::ValidationError(format!(
            "Currency '{}' must be a three-letter code",
            code
        )));
    }
    Ok(code.to_ascii_uppercase())
}
