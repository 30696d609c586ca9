use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use super::PgStore;
use crate::models::availability::{Availability, AvailabilityStatus};
use crate::store::{AvailabilityStore, StoreResult};

#[async_trait]
impl AvailabilityStore for PgStore {
    async fn upsert_availability(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        status: AvailabilityStatus,
        note: Option<String>,
    ) -> StoreResult<Availability> {
        let record = sqlx::query_as::<_, Availability>(
            r#"
            INSERT INTO availabilities (id, provider_id, date, status, note, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (provider_id, date)
            DO UPDATE SET
                status = EXCLUDED.status,
                note = EXCLUDED.note,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(provider_id)
        .bind(date)
        .bind(status)
        .bind(note)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn availability_range(
        &self,
        provider_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Availability>> {
        let records = sqlx::query_as::<_, Availability>(
            r#"
            SELECT * FROM availabilities
            WHERE provider_id = $1 AND date BETWEEN $2 AND $3
            ORDER BY date
            "#,
        )
        .bind(provider_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn delete_availability(&self, provider_id: Uuid, date: NaiveDate) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM availabilities WHERE provider_id = $1 AND date = $2")
            .bind(provider_id)
            .bind(date)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
