//! Hosted-checkout payment processors.
//!
//! The engine needs three things from a processor: create a session the
//! buyer is redirected to, tell whether a session has been paid, and close
//! a session so it can no longer be paid.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub mod mock;
pub mod stripe;

pub use mock::MockPaymentProcessor;
pub use stripe::StripeProcessor;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("payment processor unreachable: {0}")]
    Unreachable(String),

    #[error("payment processor rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionLineItem {
    pub name: String,
    pub unit_amount: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Carried as metadata and used as the idempotency key, so repeating a
    /// request for the same order yields the same session.
    pub order_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub customer_email: String,
    pub line_items: Vec<SessionLineItem>,
    pub success_url: String,
    pub cancel_url: String,
}

impl SessionRequest {
    pub fn idempotency_key(&self) -> String {
        format!("checkout-order-{}", self.order_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    Expired,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_session(&self, request: &SessionRequest)
        -> Result<PaymentSession, PaymentError>;

    async fn session_status(&self, session_id: &str) -> Result<PaymentStatus, PaymentError>;

    /// Closes an open session. Returns the session's final status: `Expired`
    /// once it can no longer be paid, `Paid` when the buyer got there first.
    async fn expire_session(&self, session_id: &str) -> Result<PaymentStatus, PaymentError>;
}
