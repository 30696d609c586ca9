use axum::response::Response;
use serde::Serialize;

use crate::utils::response::success;

pub mod actor;
pub mod availability;
pub mod bookings;
pub mod orders;
pub mod payments;
pub mod slots;
pub mod tickets;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "marketplace-api",
    };

    success(payload, "Health check successful")
}
