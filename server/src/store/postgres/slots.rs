use async_trait::async_trait;
use uuid::Uuid;

use super::PgStore;
use crate::models::slot::{ActivitySlot, NewSlot, SlotStatus};
use crate::store::{
    insufficient_slot, slot_not_found, slot_status_refusal, SlotStore, StoreResult,
};
use crate::utils::error::AppError;

#[async_trait]
impl SlotStore for PgStore {
    async fn activity_owner(&self, activity_id: Uuid) -> StoreResult<Option<Uuid>> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT provider_id FROM activities WHERE id = $1")
                .bind(activity_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(provider_id,)| provider_id))
    }

    async fn insert_slot(&self, activity_id: Uuid, new: NewSlot) -> StoreResult<ActivitySlot> {
        let slot = sqlx::query_as::<_, ActivitySlot>(
            r#"
            INSERT INTO activity_slots (id, activity_id, start_at, end_at, capacity_total, capacity_booked, status, note)
            VALUES ($1, $2, $3, $4, $5, 0, 'open', $6)
            ON CONFLICT (activity_id, start_at, end_at) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(activity_id)
        .bind(new.start_at)
        .bind(new.end_at)
        .bind(new.capacity_total)
        .bind(new.note)
        .fetch_optional(&self.pool)
        .await?;

        slot.ok_or_else(|| {
            AppError::Conflict("A slot with the same start and end already exists".to_string())
        })
    }

    async fn get_slot(&self, id: Uuid) -> StoreResult<Option<ActivitySlot>> {
        let slot = sqlx::query_as::<_, ActivitySlot>("SELECT * FROM activity_slots WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(slot)
    }

    async fn list_slots(&self, activity_id: Uuid) -> StoreResult<Vec<ActivitySlot>> {
        let slots = sqlx::query_as::<_, ActivitySlot>(
            "SELECT * FROM activity_slots WHERE activity_id = $1 ORDER BY start_at, end_at",
        )
        .bind(activity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(slots)
    }

    async fn set_slot_status(&self, id: Uuid, status: SlotStatus) -> StoreResult<ActivitySlot> {
        let updated = sqlx::query_as::<_, ActivitySlot>(
            r#"
            UPDATE activity_slots
            SET status = $2, updated_at = NOW()
            WHERE id = $1
              AND ($2 <> 'open'::slot_status OR capacity_booked < capacity_total)
              AND ($2 <> 'sold_out'::slot_status OR capacity_booked >= capacity_total)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(slot) = updated {
            return Ok(slot);
        }

        match self.get_slot(id).await? {
            Some(slot) => Err(slot_status_refusal(&slot, status).unwrap_or_else(|| {
                AppError::Conflict(format!("Slot '{}' changed while its status was set", id))
            })),
            None => Err(slot_not_found(id)),
        }
    }

    async fn set_slot_capacity(&self, id: Uuid, capacity_total: i32) -> StoreResult<ActivitySlot> {
        let updated = sqlx::query_as::<_, ActivitySlot>(
            r#"
            UPDATE activity_slots
            SET capacity_total = $2,
                status = CASE
                    WHEN status = 'closed' THEN status
                    WHEN capacity_booked >= $2 THEN 'sold_out'::slot_status
                    ELSE 'open'::slot_status
                END,
                updated_at = NOW()
            WHERE id = $1 AND capacity_booked <= $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(capacity_total)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(slot) = updated {
            return Ok(slot);
        }

        match self.get_slot(id).await? {
            Some(slot) => Err(AppError::Conflict(format!(
                "Capacity {} is below the {} places already booked",
                capacity_total, slot.capacity_booked
            ))),
            None => Err(slot_not_found(id)),
        }
    }

    async fn reserve_slot(&self, id: Uuid, quantity: i32) -> StoreResult<ActivitySlot> {
        let reserved = sqlx::query_as::<_, ActivitySlot>(
            r#"
            UPDATE activity_slots
            SET capacity_booked = capacity_booked + $2,
                status = CASE
                    WHEN capacity_booked + $2 = capacity_total THEN 'sold_out'::slot_status
                    ELSE status
                END,
                updated_at = NOW()
            WHERE id = $1 AND status = 'open' AND capacity_booked + $2 <= capacity_total
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(slot) = reserved {
            return Ok(slot);
        }

        match self.get_slot(id).await? {
            Some(slot) if slot.status == SlotStatus::Closed => {
                Err(AppError::Conflict(format!("Slot '{}' is closed", id)))
            }
            Some(slot) => Err(insufficient_slot(id, slot.remaining())),
            None => Err(slot_not_found(id)),
        }
    }
}
