//! Postgres implementation of the store traits.
//!
//! Counter mutations are single conditional `UPDATE` statements whose
//! returned row tells whether the guard held. Multi-row work runs inside
//! one transaction; dropping the transaction on an early `?` rolls it back.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::utils::error::AppError;

mod availability;
mod bookings;
mod orders;
mod slots;
mod tickets;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens the pool and applies pending migrations.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;

        tracing::info!("Successfully connected to database");

        sqlx::migrate!()
            .run(&pool)
            .await
            .map_err(|e| AppError::InternalServerError(format!("Migration failed: {}", e)))?;

        tracing::info!("Migrations run successfully");

        Ok(Self::new(pool))
    }
}
