use async_trait::async_trait;
use sqlx::PgConnection;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::PgStore;
use crate::models::ticket::{NewTicketType, ReservationLine, TicketType, TicketTypeUpdate};
use crate::store::{insufficient_tickets, ticket_type_not_found, StoreResult, TicketStore};
use crate::utils::error::AppError;

/// Claims inventory for every line on `conn`, which must be inside a
/// transaction. Lines are applied in id order so concurrent orders lock
/// rows in the same sequence.
pub(super) async fn reserve_lines(
    conn: &mut PgConnection,
    lines: &[ReservationLine],
) -> StoreResult<()> {
    let mut wanted: BTreeMap<Uuid, i32> = BTreeMap::new();
    for line in lines {
        *wanted.entry(line.ticket_type_id).or_default() += line.quantity;
    }

    for (id, quantity) in wanted {
        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE ticket_types
            SET sold = sold + $2, updated_at = NOW()
            WHERE id = $1 AND sold + $2 <= total
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(quantity)
        .fetch_optional(&mut *conn)
        .await?;

        if claimed.is_none() {
            let remaining: Option<(i32,)> =
                sqlx::query_as("SELECT total - sold FROM ticket_types WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut *conn)
                    .await?;
            return Err(match remaining {
                Some((remaining,)) => insufficient_tickets(id, remaining),
                None => ticket_type_not_found(id),
            });
        }
    }

    Ok(())
}

#[async_trait]
impl TicketStore for PgStore {
    async fn event_owner(&self, event_id: Uuid) -> StoreResult<Option<Uuid>> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT provider_id FROM events WHERE id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(provider_id,)| provider_id))
    }

    async fn insert_ticket_type(
        &self,
        event_id: Uuid,
        new: NewTicketType,
    ) -> StoreResult<TicketType> {
        let ticket_type = sqlx::query_as::<_, TicketType>(
            r#"
            INSERT INTO ticket_types (id, event_id, name, price, currency, total, sold)
            VALUES ($1, $2, $3, $4, $5, $6, 0)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(&new.name)
        .bind(new.price)
        .bind(&new.currency)
        .bind(new.total)
        .fetch_one(&self.pool)
        .await?;
        Ok(ticket_type)
    }

    async fn get_ticket_type(&self, id: Uuid) -> StoreResult<Option<TicketType>> {
        let ticket_type =
            sqlx::query_as::<_, TicketType>("SELECT * FROM ticket_types WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(ticket_type)
    }

    async fn get_ticket_types(&self, ids: &[Uuid]) -> StoreResult<Vec<TicketType>> {
        let types =
            sqlx::query_as::<_, TicketType>("SELECT * FROM ticket_types WHERE id = ANY($1)")
                .bind(ids.to_vec())
                .fetch_all(&self.pool)
                .await?;
        Ok(types)
    }

    async fn list_ticket_types(&self, event_id: Uuid) -> StoreResult<Vec<TicketType>> {
        let types = sqlx::query_as::<_, TicketType>(
            "SELECT * FROM ticket_types WHERE event_id = $1 ORDER BY created_at",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(types)
    }

    async fn update_ticket_type(
        &self,
        id: Uuid,
        update: TicketTypeUpdate,
    ) -> StoreResult<TicketType> {
        // The guard on `sold` lives in the statement so a concurrent sale
        // cannot slip between a check and the write.
        let updated = sqlx::query_as::<_, TicketType>(
            r#"
            UPDATE ticket_types
            SET name = COALESCE($2, name),
                price = COALESCE($3, price),
                total = COALESCE($4, total),
                updated_at = NOW()
            WHERE id = $1 AND COALESCE($4, total) >= sold
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update.name)
        .bind(update.price)
        .bind(update.total)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(ticket_type) = updated {
            return Ok(ticket_type);
        }

        match self.get_ticket_type(id).await? {
            Some(current) => Err(AppError::Conflict(format!(
                "Total {} is below the {} tickets already sold",
                update.total.unwrap_or(current.total),
                current.sold
            ))),
            None => Err(ticket_type_not_found(id)),
        }
    }

    async fn delete_ticket_type(&self, id: Uuid) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM ticket_types WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(ticket_type_not_found(id));
        }

        let items = sqlx::query("DELETE FROM order_items WHERE ticket_type_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM ticket_types WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(items)
    }

    async fn reserve(&self, lines: &[ReservationLine]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        reserve_lines(&mut *tx, lines).await?;
        tx.commit().await?;
        Ok(())
    }
}
