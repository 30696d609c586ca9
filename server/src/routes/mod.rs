use axum::{
    routing::{get, patch, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{availability, bookings, health_check, orders, payments, slots, tickets};
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        // Ticket inventory
        .route(
            "/events/:event_id/ticket-types",
            get(tickets::list_ticket_types).post(tickets::create_ticket_type),
        )
        .route(
            "/ticket-types/:id",
            get(tickets::get_ticket_type)
                .patch(tickets::update_ticket_type)
                .delete(tickets::delete_ticket_type),
        )
        // Checkout
        .route("/events/:event_id/orders", post(orders::create_order))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/retry-payment", post(orders::retry_payment))
        .route("/orders/:id/cancel", post(orders::cancel_order))
        .route("/checkout/success", get(payments::checkout_success))
        .route("/payments/webhook", post(payments::payment_webhook))
        // Bookings
        .route("/bookings", post(bookings::create_booking))
        .route("/bookings/:id", get(bookings::get_booking))
        .route("/bookings/:id/transition", post(bookings::transition_booking))
        // Provider calendars
        .route(
            "/providers/:id/availability",
            get(availability::get_availability),
        )
        .route(
            "/providers/:id/availability/:date",
            put(availability::set_availability).delete(availability::clear_availability),
        )
        // Activity slots
        .route(
            "/activities/:id/slots",
            get(slots::list_slots).post(slots::create_slot),
        )
        .route("/slots/:id/status", patch(slots::set_slot_status))
        .route("/slots/:id/capacity", patch(slots::update_slot_capacity))
        .route("/slots/:id/reservations", post(slots::reserve_slot))
        .with_state(state);

    create_security_headers_layer()
        .apply(api)
        .layer(create_cors_layer())
        .layer(TraceLayer::new_for_http())
}
