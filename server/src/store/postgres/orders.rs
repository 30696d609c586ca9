use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::tickets::reserve_lines;
use super::PgStore;
use crate::models::order::{
    NewOrder, Order, OrderItem, OrderStatus, SettleOutcome, Settlement,
};
use crate::models::ticket::ReservationLine;
use crate::store::{order_not_found, session_replaced, OrderStore, StoreResult};
use crate::utils::error::AppError;

fn not_pending(order: &Order, action: &str) -> AppError {
    AppError::Conflict(format!(
        "Order '{}' is {} and cannot {}",
        order.id,
        order.status.as_str(),
        action
    ))
}

#[async_trait]
impl OrderStore for PgStore {
    async fn create_order(&self, new: NewOrder, settlement: Settlement) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await?;

        let status = match settlement {
            Settlement::Immediate => {
                let lines: Vec<ReservationLine> = new
                    .items
                    .iter()
                    .map(|item| ReservationLine {
                        ticket_type_id: item.ticket_type_id,
                        quantity: item.quantity,
                    })
                    .collect();
                reserve_lines(&mut *tx, &lines).await?;
                OrderStatus::Paid
            }
            Settlement::Deferred => OrderStatus::Pending,
        };

        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (id, event_id, buyer_id, email, status, total, currency)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(new.id)
        .bind(new.event_id)
        .bind(new.buyer_id)
        .bind(&new.email)
        .bind(status)
        .bind(new.total)
        .bind(&new.currency)
        .fetch_one(&mut *tx)
        .await?;

        for item in &new.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, ticket_type_id, name, quantity, unit_price, currency)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order.id)
            .bind(item.ticket_type_id)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(&new.currency)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(order)
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    async fn order_items(&self, order_id: Uuid) -> StoreResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT id, order_id, ticket_type_id, name, quantity, unit_price, currency
            FROM order_items
            WHERE order_id = $1
            ORDER BY ticket_type_id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn attach_payment_session(
        &self,
        order_id: Uuid,
        session_id: &str,
        checkout_url: &str,
    ) -> StoreResult<Order> {
        let updated = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET payment_session_id = $2, checkout_url = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(session_id)
        .bind(checkout_url)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(order) => Ok(order),
            None => match self.get_order(order_id).await? {
                Some(order) => Err(not_pending(&order, "take a payment session")),
                None => Err(order_not_found(order_id)),
            },
        }
    }

    async fn settle_order(&self, session_id: &str) -> StoreResult<SettleOutcome> {
        let mut tx = self.pool.begin().await?;

        // The row lock serialises concurrent confirmations of one session.
        let order = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE payment_session_id = $1 FOR UPDATE",
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("No order for payment session '{}'", session_id))
        })?;

        match order.status {
            OrderStatus::Paid => Ok(SettleOutcome::AlreadyPaid(order.id)),
            OrderStatus::Canceled => Err(AppError::Conflict(format!(
                "Order '{}' was canceled before payment was confirmed",
                order.id
            ))),
            OrderStatus::Pending => {
                let lines: Vec<(Uuid, i32)> = sqlx::query_as(
                    "SELECT ticket_type_id, quantity FROM order_items WHERE order_id = $1",
                )
                .bind(order.id)
                .fetch_all(&mut *tx)
                .await?;
                let lines: Vec<ReservationLine> = lines
                    .into_iter()
                    .map(|(ticket_type_id, quantity)| ReservationLine {
                        ticket_type_id,
                        quantity,
                    })
                    .collect();

                reserve_lines(&mut *tx, &lines).await?;

                sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
                    .bind(order.id)
                    .bind(OrderStatus::Paid)
                    .execute(&mut *tx)
                    .await?;

                tx.commit().await?;
                Ok(SettleOutcome::Settled(order.id))
            }
        }
    }

    async fn cancel_order(&self, order_id: Uuid, session_id: Option<&str>) -> StoreResult<Order> {
        let canceled = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET status = 'canceled', updated_at = NOW()
            WHERE id = $1 AND status = 'pending' AND payment_session_id IS NOT DISTINCT FROM $2
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(order) = canceled {
            return Ok(order);
        }

        match self.get_order(order_id).await? {
            Some(order) if order.status == OrderStatus::Canceled => Ok(order),
            Some(order) if order.status == OrderStatus::Pending => Err(session_replaced(order.id)),
            Some(order) => Err(not_pending(&order, "be canceled")),
            None => Err(order_not_found(order_id)),
        }
    }

    async fn find_order_by_session(&self, session_id: &str) -> StoreResult<Option<Order>> {
        let order =
            sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE payment_session_id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(order)
    }

    async fn stale_pending_orders(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE status = 'pending' AND created_at < $1
            ORDER BY created_at
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }
}
