use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Canceled => "canceled",
        }
    }
}

/// A ticket purchase. `total` is in minor units of `currency`.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub event_id: Uuid,
    pub buyer_id: Option<Uuid>,
    pub email: String,
    pub status: OrderStatus,
    pub total: i64,
    pub currency: String,
    pub payment_session_id: Option<String>,
    pub checkout_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Name, price and currency are snapshots taken when the order was placed.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub ticket_type_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub ticket_type_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub email: String,
    #[serde(default)]
    pub buyer_id: Option<Uuid>,
    pub items: Vec<CartLine>,
}

/// Fully priced order ready to be written by a store.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Uuid,
    pub event_id: Uuid,
    pub buyer_id: Option<Uuid>,
    pub email: String,
    pub total: i64,
    pub currency: String,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub ticket_type_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: i64,
}

/// How an order is written: reserved and paid in one step, or left
/// pending until the payment processor reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Immediate,
    Deferred,
}

/// Result of applying a payment confirmation to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Settled(Uuid),
    AlreadyPaid(Uuid),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub total: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
}
