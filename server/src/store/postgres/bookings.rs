use async_trait::async_trait;
use uuid::Uuid;

use super::PgStore;
use crate::models::booking::{Booking, BookingStatus};
use crate::store::{BookingStore, StoreResult};

#[async_trait]
impl BookingStore for PgStore {
    async fn insert_booking(&self, booking: Booking) -> StoreResult<Booking> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            INSERT INTO bookings (id, user_id, provider_id, date, city, status, price_gross, fee)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(booking.id)
        .bind(booking.user_id)
        .bind(booking.provider_id)
        .bind(booking.date)
        .bind(&booking.city)
        .bind(booking.status)
        .bind(booking.price_gross)
        .bind(booking.fee)
        .fetch_one(&self.pool)
        .await?;
        Ok(booking)
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(booking)
    }

    async fn update_booking_status(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> StoreResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;
        Ok(booking)
    }
}
