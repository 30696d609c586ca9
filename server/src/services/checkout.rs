//! Order checkout: cart validation, settlement and payment reconciliation.
//!
//! Without a payment processor orders are reserved and paid in one atomic
//! store call. With one, the order is written as pending and inventory is
//! claimed only when the processor confirms payment; settlement is keyed
//! on the session id and happens at most once. A pending order is only
//! canceled after its session has been closed at the processor, so a buyer
//! can never pay for an order that is already gone.

use chrono::{TimeDelta, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::OrderPolicy;
use crate::models::order::{
    CartLine, CheckoutReceipt, CheckoutRequest, NewOrder, NewOrderItem, Order, OrderDetails,
    OrderItem, OrderStatus, SettleOutcome, Settlement,
};
use crate::payments::{PaymentProcessor, PaymentStatus, SessionLineItem, SessionRequest};
use crate::store::{order_not_found, OrderStore, TicketStore};
use crate::utils::error::AppError;

/// What closing a pending order led to.
enum Closed {
    Canceled(Order),
    /// The buyer paid before the session closed; the order was settled.
    Settled(Uuid),
}

pub struct Checkout {
    tickets: Arc<dyn TicketStore>,
    orders: Arc<dyn OrderStore>,
    processor: Option<Arc<dyn PaymentProcessor>>,
    public_base_url: String,
}

fn validate_email(email: &str) -> Result<String, AppError> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    };
    if !valid {
        return Err(AppError::ValidationError(
            "A valid contact email is required".to_string(),
        ));
    }
    Ok(email.to_string())
}

/// Merges repeated ticket types and rejects empty or non-positive lines.
fn normalize_cart(items: &[CartLine]) -> Result<BTreeMap<Uuid, i32>, AppError> {
    if items.is_empty() {
        return Err(AppError::ValidationError(
            "The cart is empty".to_string(),
        ));
    }
    let mut cart: BTreeMap<Uuid, i32> = BTreeMap::new();
    for line in items {
        if line.quantity <= 0 {
            return Err(AppError::ValidationError(format!(
                "Quantity for ticket type '{}' must be greater than zero",
                line.ticket_type_id
            )));
        }
        let quantity = cart.entry(line.ticket_type_id).or_default();
        *quantity = quantity.checked_add(line.quantity).ok_or_else(|| {
            AppError::ValidationError("Requested quantity is too large".to_string())
        })?;
    }
    Ok(cart)
}

fn session_line_items(items: &[NewOrderItem]) -> Vec<SessionLineItem> {
    items
        .iter()
        .map(|item| SessionLineItem {
            name: item.name.clone(),
            unit_amount: item.unit_price,
            quantity: item.quantity,
        })
        .collect()
}

/// Rebuilds the line items exactly as the first attempt sent them, so a
/// retry under the same idempotency key carries the same parameters.
fn stored_line_items(items: &[OrderItem]) -> Vec<SessionLineItem> {
    let mut items: Vec<&OrderItem> = items.iter().collect();
    items.sort_by_key(|item| item.ticket_type_id);
    items
        .into_iter()
        .map(|item| SessionLineItem {
            name: item.name.clone(),
            unit_amount: item.unit_price,
            quantity: item.quantity,
        })
        .collect()
}

impl Checkout {
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        orders: Arc<dyn OrderStore>,
        processor: Option<Arc<dyn PaymentProcessor>>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            tickets,
            orders,
            processor,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn settlement(&self) -> Settlement {
        match self.processor {
            Some(_) => Settlement::Deferred,
            None => Settlement::Immediate,
        }
    }

    fn processor(&self) -> Result<&Arc<dyn PaymentProcessor>, AppError> {
        self.processor.as_ref().ok_or_else(|| {
            AppError::Conflict("No payment processor is configured".to_string())
        })
    }

    /// Validates the cart and prices it from the current ticket types.
    /// Nothing is written.
    async fn price_cart(
        &self,
        event_id: Uuid,
        request: &CheckoutRequest,
    ) -> Result<NewOrder, AppError> {
        let email = validate_email(&request.email)?;
        let cart = normalize_cart(&request.items)?;

        let ids: Vec<Uuid> = cart.keys().copied().collect();
        let types: HashMap<Uuid, _> = self
            .tickets
            .get_ticket_types(&ids)
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let mut currency: Option<&str> = None;
        let mut total: i64 = 0;
        let mut items = Vec::with_capacity(cart.len());

        for (id, quantity) in &cart {
            let ticket_type = types
                .get(id)
                .filter(|t| t.event_id == event_id)
                .ok_or_else(|| {
                    AppError::ValidationError(format!(
                        "Ticket type '{}' does not belong to this event",
                        id
                    ))
                })?;

            match currency {
                None => currency = Some(&ticket_type.currency),
                Some(c) if c != ticket_type.currency => {
                    return Err(AppError::ValidationError(
                        "All tickets in one order must share a currency".to_string(),
                    ));
                }
                Some(_) => {}
            }

            // Advisory only; the store re-checks atomically.
            if *quantity > ticket_type.remaining() {
                return Err(AppError::InsufficientInventory {
                    resource: "ticket_type",
                    id: *id,
                    remaining: ticket_type.remaining().max(0),
                });
            }

            let line_total = ticket_type
                .price
                .checked_mul(i64::from(*quantity))
                .and_then(|line| total.checked_add(line))
                .ok_or_else(|| {
                    AppError::ValidationError("Order total is too large".to_string())
                })?;
            total = line_total;

            items.push(NewOrderItem {
                ticket_type_id: *id,
                name: ticket_type.name.clone(),
                quantity: *quantity,
                unit_price: ticket_type.price,
            });
        }

        Ok(NewOrder {
            id: Uuid::new_v4(),
            event_id,
            buyer_id: request.buyer_id,
            email,
            total,
            currency: currency.unwrap_or_default().to_string(),
            items,
        })
    }

    pub async fn create_order(
        &self,
        event_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CheckoutReceipt, AppError> {
        let new_order = self.price_cart(event_id, &request).await?;
        let line_items = session_line_items(&new_order.items);
        let settlement = self.settlement();

        let order = self.orders.create_order(new_order, settlement).await?;
        info!(
            order_id = %order.id,
            event_id = %event_id,
            status = order.status.as_str(),
            total = order.total,
            currency = %order.currency,
            "Order created"
        );

        match &self.processor {
            None => Ok(self.receipt(&order)),
            Some(processor) => {
                let order = self.open_session(processor, &order, line_items).await?;
                Ok(self.receipt(&order))
            }
        }
    }

    fn receipt(&self, order: &Order) -> CheckoutReceipt {
        CheckoutReceipt {
            order_id: order.id,
            status: order.status,
            total: order.total,
            currency: order.currency.clone(),
            checkout_url: order.checkout_url.clone(),
        }
    }

    /// Creates (or re-fetches, via the idempotency key) the processor
    /// session for a pending order and records it.
    async fn open_session(
        &self,
        processor: &Arc<dyn PaymentProcessor>,
        order: &Order,
        line_items: Vec<SessionLineItem>,
    ) -> Result<Order, AppError> {
        let request = SessionRequest {
            order_id: order.id,
            amount: order.total,
            currency: order.currency.clone(),
            customer_email: order.email.clone(),
            line_items,
            success_url: format!(
                "{}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}",
                self.public_base_url
            ),
            cancel_url: format!("{}/orders/{}", self.public_base_url, order.id),
        };

        let session = processor.create_session(&request).await.map_err(|e| {
            AppError::ExternalServiceError {
                message: format!("{} session for order {}: {}", processor.name(), order.id, e),
                order_id: Some(order.id),
            }
        })?;

        let order = match self
            .orders
            .attach_payment_session(order.id, &session.id, &session.url)
            .await
        {
            Ok(order) => order,
            Err(e) => {
                // The order stopped being pending while the session was
                // opened; nothing may be paid through it.
                if let Err(expire_err) = processor.expire_session(&session.id).await {
                    warn!(
                        order_id = %order.id,
                        session_id = %session.id,
                        error = %expire_err,
                        "Orphaned payment session could not be closed"
                    );
                }
                return Err(e);
            }
        };
        info!(
            order_id = %order.id,
            session_id = %session.id,
            processor = processor.name(),
            "Payment session attached"
        );
        Ok(order)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, AppError> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| order_not_found(order_id))?;
        let items = self.orders.order_items(order_id).await?;
        Ok(OrderDetails { order, items })
    }

    /// Returns the existing session of a pending order, or opens one if an
    /// earlier attempt failed.
    pub async fn retry_payment(&self, order_id: Uuid) -> Result<CheckoutReceipt, AppError> {
        let processor = self.processor()?;
        let details = self.get_order(order_id).await?;
        let order = details.order;

        if order.status != OrderStatus::Pending {
            return Err(AppError::Conflict(format!(
                "Order '{}' is {} and needs no payment",
                order.id,
                order.status.as_str()
            )));
        }
        if order.checkout_url.is_some() {
            return Ok(self.receipt(&order));
        }

        let line_items = stored_line_items(&details.items);
        let order = self.open_session(processor, &order, line_items).await?;
        Ok(self.receipt(&order))
    }

    /// Applies a processor's payment confirmation. Confirming an order that
    /// is already paid is a no-op.
    pub async fn confirm_order(&self, session_id: &str) -> Result<Uuid, AppError> {
        match self.orders.settle_order(session_id).await {
            Ok(SettleOutcome::Settled(order_id)) => {
                info!(order_id = %order_id, session_id = %session_id, "Order paid");
                Ok(order_id)
            }
            Ok(SettleOutcome::AlreadyPaid(order_id)) => {
                info!(
                    order_id = %order_id,
                    session_id = %session_id,
                    "Duplicate payment confirmation ignored"
                );
                Ok(order_id)
            }
            Err(e @ AppError::InsufficientInventory { .. }) | Err(e @ AppError::Conflict(_)) => {
                // Money was taken but the tickets cannot be issued.
                error!(
                    session_id = %session_id,
                    error = %e,
                    "Paid session needs manual reconciliation"
                );
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Handles the buyer returning from the hosted checkout page. The
    /// processor is asked for the session status rather than trusting the
    /// redirect.
    pub async fn confirm_from_redirect(&self, session_id: &str) -> Result<OrderDetails, AppError> {
        let processor = self.processor()?;
        let order = self
            .orders
            .find_order_by_session(session_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("No order for payment session '{}'", session_id))
            })?;

        let status = processor.session_status(session_id).await.map_err(|e| {
            AppError::ExternalServiceError {
                message: format!("{} status for session {}: {}", processor.name(), session_id, e),
                order_id: Some(order.id),
            }
        })?;

        match status {
            PaymentStatus::Paid => {
                self.confirm_order(session_id).await?;
            }
            PaymentStatus::Expired => {
                self.mark_canceled(order.id, Some(session_id)).await?;
            }
            PaymentStatus::Unpaid => {}
        }
        self.get_order(order.id).await
    }

    /// Cancels a pending order. An open payment session is closed first;
    /// if the buyer already paid, the order is settled and the cancel is
    /// refused.
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<Order, AppError> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| order_not_found(order_id))?;
        if order.status != OrderStatus::Pending {
            return self
                .orders
                .cancel_order(order.id, order.payment_session_id.as_deref())
                .await;
        }

        match self.close_and_cancel(&order).await? {
            Closed::Canceled(order) => Ok(order),
            Closed::Settled(order_id) => Err(AppError::Conflict(format!(
                "Order '{}' was paid before it could be canceled",
                order_id
            ))),
        }
    }

    async fn close_and_cancel(&self, order: &Order) -> Result<Closed, AppError> {
        let session = order.payment_session_id.as_deref();
        if let (Some(session_id), Some(processor)) = (session, self.processor.as_ref()) {
            let status = processor.expire_session(session_id).await.map_err(|e| {
                AppError::ExternalServiceError {
                    message: format!("{} expiry of session {}: {}", processor.name(), session_id, e),
                    order_id: Some(order.id),
                }
            })?;
            match status {
                PaymentStatus::Expired => {}
                PaymentStatus::Paid => {
                    let order_id = self.confirm_order(session_id).await?;
                    return Ok(Closed::Settled(order_id));
                }
                PaymentStatus::Unpaid => {
                    return Err(AppError::ExternalServiceError {
                        message: format!("{} kept session {} open", processor.name(), session_id),
                        order_id: Some(order.id),
                    });
                }
            }
        }
        self.mark_canceled(order.id, session).await.map(Closed::Canceled)
    }

    async fn mark_canceled(&self, order_id: Uuid, session_id: Option<&str>) -> Result<Order, AppError> {
        let order = self.orders.cancel_order(order_id, session_id).await?;
        info!(order_id = %order_id, "Order canceled");
        Ok(order)
    }

    /// Cancels the pending order behind a session the processor reported
    /// as expired, if any.
    pub async fn cancel_by_session(&self, session_id: &str) -> Result<Option<Order>, AppError> {
        match self.orders.find_order_by_session(session_id).await? {
            Some(order) if order.status == OrderStatus::Pending => {
                self.mark_canceled(order.id, Some(session_id)).await.map(Some)
            }
            Some(order) => Ok(Some(order)),
            None => Ok(None),
        }
    }

    /// Cancels pending orders older than `ttl` whose session could be
    /// closed. Pending orders hold no inventory, so nothing is released.
    /// Orders the processor could not close stay pending for the next sweep.
    pub async fn expire_stale_orders(&self, ttl: TimeDelta) -> Result<Vec<Uuid>, AppError> {
        let Some(cutoff) = Utc::now().checked_sub_signed(ttl) else {
            return Ok(Vec::new());
        };

        let mut expired = Vec::new();
        for order in self.orders.stale_pending_orders(cutoff).await? {
            match self.close_and_cancel(&order).await {
                Ok(Closed::Canceled(order)) => expired.push(order.id),
                Ok(Closed::Settled(order_id)) => {
                    info!(order_id = %order_id, "Stale order was paid before its session closed");
                }
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "Stale order left pending");
                }
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), cutoff = %cutoff, "Expired stale pending orders");
        }
        Ok(expired)
    }
}

/// Periodically cancels stale pending orders. Returns `None` when expiry
/// is disabled or checkout settles immediately.
pub fn spawn_expiry_task(checkout: Arc<Checkout>, policy: &OrderPolicy) -> Option<JoinHandle<()>> {
    if policy.pending_ttl_minutes <= 0 || checkout.settlement() == Settlement::Immediate {
        return None;
    }
    let ttl = policy.pending_ttl();
    let period = Duration::from_secs(policy.sweep_interval_seconds.max(1));

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if let Err(e) = checkout.expire_stale_orders(ttl).await {
                warn!(error = %e, "Pending order sweep failed");
            }
        }
    }))
}
