//! Persistence traits for the inventory and lifecycle engine.
//!
//! Every mutation of a shared counter (`sold`, `capacity_booked`) goes
//! through a store method that checks and increments in one atomic step.
//! Services never read a counter and write it back.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::availability::{Availability, AvailabilityStatus};
use crate::models::booking::{Booking, BookingStatus};
use crate::models::order::{NewOrder, Order, OrderItem, SettleOutcome, Settlement};
use crate::models::slot::{ActivitySlot, NewSlot, SlotStatus};
use crate::models::ticket::{NewTicketType, ReservationLine, TicketType, TicketTypeUpdate};
use crate::utils::error::AppError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, AppError>;

#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Provider owning the event, or `None` when the event does not exist.
    async fn event_owner(&self, event_id: Uuid) -> StoreResult<Option<Uuid>>;

    async fn insert_ticket_type(
        &self,
        event_id: Uuid,
        new: NewTicketType,
    ) -> StoreResult<TicketType>;

    async fn get_ticket_type(&self, id: Uuid) -> StoreResult<Option<TicketType>>;

    async fn get_ticket_types(&self, ids: &[Uuid]) -> StoreResult<Vec<TicketType>>;

    async fn list_ticket_types(&self, event_id: Uuid) -> StoreResult<Vec<TicketType>>;

    /// Fails with `Conflict` when the new total would drop below `sold`.
    async fn update_ticket_type(
        &self,
        id: Uuid,
        update: TicketTypeUpdate,
    ) -> StoreResult<TicketType>;

    /// Removes the type's order items, then the type. Returns the number of
    /// items removed.
    async fn delete_ticket_type(&self, id: Uuid) -> StoreResult<u64>;

    /// All-or-nothing increment of `sold` for every line.
    async fn reserve(&self, lines: &[ReservationLine]) -> StoreResult<()>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Writes the order and its items. With `Settlement::Immediate` the
    /// inventory is reserved in the same atomic unit and the order is
    /// stored as paid; otherwise it is stored as pending.
    async fn create_order(&self, order: NewOrder, settlement: Settlement) -> StoreResult<Order>;

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>>;

    async fn order_items(&self, order_id: Uuid) -> StoreResult<Vec<OrderItem>>;

    /// Records the processor session on a pending order.
    async fn attach_payment_session(
        &self,
        order_id: Uuid,
        session_id: &str,
        checkout_url: &str,
    ) -> StoreResult<Order>;

    /// Marks the order behind `session_id` paid and reserves its inventory,
    /// exactly once.
    async fn settle_order(&self, session_id: &str) -> StoreResult<SettleOutcome>;

    /// Moves a pending order to canceled, provided its payment session is
    /// still `session_id`. Returns the order as it stands afterwards.
    async fn cancel_order(&self, order_id: Uuid, session_id: Option<&str>) -> StoreResult<Order>;

    async fn find_order_by_session(&self, session_id: &str) -> StoreResult<Option<Order>>;

    /// Pending orders created before `cutoff`, oldest first.
    async fn stale_pending_orders(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Order>>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert_booking(&self, booking: Booking) -> StoreResult<Booking>;

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    /// Compare-and-set on the status. `None` when the booking is no longer
    /// in `from`.
    async fn update_booking_status(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> StoreResult<Option<Booking>>;
}

#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    async fn upsert_availability(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        status: AvailabilityStatus,
        note: Option<String>,
    ) -> StoreResult<Availability>;

    /// Records between `from` and `to`, both inclusive, ordered by date.
    async fn availability_range(
        &self,
        provider_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Availability>>;

    async fn delete_availability(&self, provider_id: Uuid, date: NaiveDate) -> StoreResult<bool>;
}

#[async_trait]
pub trait SlotStore: Send + Sync {
    async fn activity_owner(&self, activity_id: Uuid) -> StoreResult<Option<Uuid>>;

    /// Fails with `Conflict` when a slot with the same window exists.
    async fn insert_slot(&self, activity_id: Uuid, new: NewSlot) -> StoreResult<ActivitySlot>;

    async fn get_slot(&self, id: Uuid) -> StoreResult<Option<ActivitySlot>>;

    async fn list_slots(&self, activity_id: Uuid) -> StoreResult<Vec<ActivitySlot>>;

    /// Fails with `Conflict` when `status` disagrees with the booked count at
    /// the moment of the write: `open` needs room, `sold_out` needs none.
    async fn set_slot_status(&self, id: Uuid, status: SlotStatus) -> StoreResult<ActivitySlot>;

    /// Fails with `Conflict` when the new total would drop below the booked
    /// count.
    async fn set_slot_capacity(&self, id: Uuid, capacity_total: i32) -> StoreResult<ActivitySlot>;

    /// Conditional increment of `capacity_booked` on an open slot.
    async fn reserve_slot(&self, id: Uuid, quantity: i32) -> StoreResult<ActivitySlot>;
}

pub(crate) fn ticket_type_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Ticket type '{}' was not found", id))
}

pub(crate) fn order_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Order '{}' was not found", id))
}

pub(crate) fn session_replaced(id: Uuid) -> AppError {
    AppError::Conflict(format!(
        "Order '{}' has a new payment session and was not canceled",
        id
    ))
}

pub(crate) fn slot_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Slot '{}' was not found", id))
}

/// Why `status` cannot be written to `slot` as it stands, if it cannot.
pub(crate) fn slot_status_refusal(slot: &ActivitySlot, status: SlotStatus) -> Option<AppError> {
    match status {
        SlotStatus::SoldOut if slot.remaining() > 0 => Some(AppError::Conflict(format!(
            "Slot '{}' still has {} places left",
            slot.id,
            slot.remaining()
        ))),
        SlotStatus::Open if slot.remaining() <= 0 => Some(AppError::Conflict(format!(
            "Slot '{}' is full and cannot be reopened",
            slot.id
        ))),
        _ => None,
    }
}

pub(crate) fn insufficient_tickets(id: Uuid, remaining: i32) -> AppError {
    AppError::InsufficientInventory {
        resource: "ticket_type",
        id,
        remaining: remaining.max(0),
    }
}

pub(crate) fn insufficient_slot(id: Uuid, remaining: i32) -> AppError {
    AppError::InsufficientInventory {
        resource: "slot",
        id,
        remaining: remaining.max(0),
    }
}
