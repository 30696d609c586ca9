//! In-process store used by tests and by the service when no database is
//! configured. One lock guards every table, so each method is a
//! serializable unit just like a Postgres transaction.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::{
    insufficient_slot, insufficient_tickets, order_not_found, session_replaced, slot_not_found,
    slot_status_refusal, ticket_type_not_found, AvailabilityStore, BookingStore, OrderStore, SlotStore, StoreResult,
    TicketStore,
};
use crate::models::availability::{Availability, AvailabilityStatus};
use crate::models::booking::{Booking, BookingStatus};
use crate::models::order::{
    NewOrder, Order, OrderItem, OrderStatus, SettleOutcome, Settlement,
};
use crate::models::slot::{ActivitySlot, NewSlot, SlotStatus};
use crate::models::ticket::{NewTicketType, ReservationLine, TicketType, TicketTypeUpdate};
use crate::utils::error::AppError;

#[derive(Default)]
struct Tables {
    events: HashMap<Uuid, Uuid>,
    activities: HashMap<Uuid, Uuid>,
    ticket_types: HashMap<Uuid, TicketType>,
    orders: HashMap<Uuid, Order>,
    order_items: Vec<OrderItem>,
    bookings: HashMap<Uuid, Booking>,
    availability: BTreeMap<(Uuid, NaiveDate), Availability>,
    slots: HashMap<Uuid, ActivitySlot>,
}

impl Tables {
    /// Checks every line before touching any counter.
    fn reserve(&mut self, lines: &[ReservationLine]) -> StoreResult<()> {
        let mut wanted: BTreeMap<Uuid, i32> = BTreeMap::new();
        for line in lines {
            *wanted.entry(line.ticket_type_id).or_default() += line.quantity;
        }

        for (id, quantity) in &wanted {
            let ticket_type = self
                .ticket_types
                .get(id)
                .ok_or_else(|| ticket_type_not_found(*id))?;
            if *quantity > ticket_type.remaining() {
                return Err(insufficient_tickets(*id, ticket_type.remaining()));
            }
        }

        let now = Utc::now();
        for (id, quantity) in wanted {
            if let Some(ticket_type) = self.ticket_types.get_mut(&id) {
                ticket_type.sold += quantity;
                ticket_type.updated_at = now;
            }
        }
        Ok(())
    }

    fn items_as_lines(&self, order_id: Uuid) -> Vec<ReservationLine> {
        self.order_items
            .iter()
            .filter(|item| item.order_id == order_id)
            .map(|item| ReservationLine {
                ticket_type_id: item.ticket_type_id,
                quantity: item.quantity,
            })
            .collect()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an event row as the catalogue would.
    pub fn register_event(&self, event_id: Uuid, provider_id: Uuid) {
        self.tables.lock().events.insert(event_id, provider_id);
    }

    /// Seeds an activity row as the catalogue would.
    pub fn register_activity(&self, activity_id: Uuid, provider_id: Uuid) {
        self.tables.lock().activities.insert(activity_id, provider_id);
    }

    /// Moves an order's creation time back, for expiry tests.
    pub fn backdate_order(&self, order_id: Uuid, created_at: DateTime<Utc>) {
        if let Some(order) = self.tables.lock().orders.get_mut(&order_id) {
            order.created_at = created_at;
        }
    }

    pub fn availability_count(&self, provider_id: Uuid) -> usize {
        self.tables
            .lock()
            .availability
            .keys()
            .filter(|(provider, _)| *provider == provider_id)
            .count()
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn event_owner(&self, event_id: Uuid) -> StoreResult<Option<Uuid>> {
        Ok(self.tables.lock().events.get(&event_id).copied())
    }

    async fn insert_ticket_type(
        &self,
        event_id: Uuid,
        new: NewTicketType,
    ) -> StoreResult<TicketType> {
        let mut tables = self.tables.lock();
        if !tables.events.contains_key(&event_id) {
            return Err(AppError::NotFound(format!(
                "Event '{}' was not found",
                event_id
            )));
        }
        let now = Utc::now();
        let ticket_type = TicketType {
            id: Uuid::new_v4(),
            event_id,
            name: new.name,
            price: new.price,
            currency: new.currency,
            total: new.total,
            sold: 0,
            created_at: now,
            updated_at: now,
        };
        tables
            .ticket_types
            .insert(ticket_type.id, ticket_type.clone());
        Ok(ticket_type)
    }

    async fn get_ticket_type(&self, id: Uuid) -> StoreResult<Option<TicketType>> {
        Ok(self.tables.lock().ticket_types.get(&id).cloned())
    }

    async fn get_ticket_types(&self, ids: &[Uuid]) -> StoreResult<Vec<TicketType>> {
        let tables = self.tables.lock();
        Ok(ids
            .iter()
            .filter_map(|id| tables.ticket_types.get(id).cloned())
            .collect())
    }

    async fn list_ticket_types(&self, event_id: Uuid) -> StoreResult<Vec<TicketType>> {
        let tables = self.tables.lock();
        let mut types: Vec<TicketType> = tables
            .ticket_types
            .values()
            .filter(|t| t.event_id == event_id)
            .cloned()
            .collect();
        types.sort_by_key(|t| t.created_at);
        Ok(types)
    }

    async fn update_ticket_type(
        &self,
        id: Uuid,
        update: TicketTypeUpdate,
    ) -> StoreResult<TicketType> {
        let mut tables = self.tables.lock();
        let ticket_type = tables
            .ticket_types
            .get_mut(&id)
            .ok_or_else(|| ticket_type_not_found(id))?;

        if let Some(total) = update.total {
            if total < ticket_type.sold {
                return Err(AppError::Conflict(format!(
                    "Total {} is below the {} tickets already sold",
                    total, ticket_type.sold
                )));
            }
            ticket_type.total = total;
        }
        if let Some(name) = update.name {
            ticket_type.name = name;
        }
        if let Some(price) = update.price {
            ticket_type.price = price;
        }
        ticket_type.updated_at = Utc::now();
        Ok(ticket_type.clone())
    }

    async fn delete_ticket_type(&self, id: Uuid) -> StoreResult<u64> {
        let mut tables = self.tables.lock();
        if !tables.ticket_types.contains_key(&id) {
            return Err(ticket_type_not_found(id));
        }
        let before = tables.order_items.len();
        tables.order_items.retain(|item| item.ticket_type_id != id);
        let removed = (before - tables.order_items.len()) as u64;
        tables.ticket_types.remove(&id);
        Ok(removed)
    }

    async fn reserve(&self, lines: &[ReservationLine]) -> StoreResult<()> {
        self.tables.lock().reserve(lines)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create_order(&self, new: NewOrder, settlement: Settlement) -> StoreResult<Order> {
        let mut tables = self.tables.lock();

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
                tables.reserve(&lines)?;
                OrderStatus::Paid
            }
            Settlement::Deferred => OrderStatus::Pending,
        };

        let now = Utc::now();
        let order = Order {
            id: new.id,
            event_id: new.event_id,
            buyer_id: new.buyer_id,
            email: new.email,
            status,
            total: new.total,
            currency: new.currency.clone(),
            payment_session_id: None,
            checkout_url: None,
            created_at: now,
            updated_at: now,
        };
        for item in new.items {
            tables.order_items.push(OrderItem {
                id: Uuid::new_v4(),
                order_id: order.id,
                ticket_type_id: item.ticket_type_id,
                name: item.name,
                quantity: item.quantity,
                unit_price: item.unit_price,
                currency: new.currency.clone(),
            });
        }
        tables.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.tables.lock().orders.get(&id).cloned())
    }

    async fn order_items(&self, order_id: Uuid) -> StoreResult<Vec<OrderItem>> {
        Ok(self
            .tables
            .lock()
            .order_items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn attach_payment_session(
        &self,
        order_id: Uuid,
        session_id: &str,
        checkout_url: &str,
    ) -> StoreResult<Order> {
        let mut tables = self.tables.lock();
        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| order_not_found(order_id))?;
        if order.status != OrderStatus::Pending {
            return Err(AppError::Conflict(format!(
                "Order '{}' is {} and cannot take a payment session",
                order_id,
                order.status.as_str()
            )));
        }
        order.payment_session_id = Some(session_id.to_string());
        order.checkout_url = Some(checkout_url.to_string());
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn settle_order(&self, session_id: &str) -> StoreResult<SettleOutcome> {
        let mut tables = self.tables.lock();
        let order = tables
            .orders
            .values()
            .find(|o| o.payment_session_id.as_deref() == Some(session_id))
            .cloned()
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
                let lines = tables.items_as_lines(order.id);
                tables.reserve(&lines)?;
                if let Some(stored) = tables.orders.get_mut(&order.id) {
                    stored.status = OrderStatus::Paid;
                    stored.updated_at = Utc::now();
                }
                Ok(SettleOutcome::Settled(order.id))
            }
        }
    }

    async fn cancel_order(&self, order_id: Uuid, session_id: Option<&str>) -> StoreResult<Order> {
        let mut tables = self.tables.lock();
        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| order_not_found(order_id))?;
        match order.status {
            OrderStatus::Pending if order.payment_session_id.as_deref() != session_id => {
                Err(session_replaced(order_id))
            }
            OrderStatus::Pending => {
                order.status = OrderStatus::Canceled;
                order.updated_at = Utc::now();
                Ok(order.clone())
            }
            OrderStatus::Canceled => Ok(order.clone()),
            OrderStatus::Paid => Err(AppError::Conflict(format!(
                "Order '{}' is already paid and cannot be canceled",
                order_id
            ))),
        }
    }

    async fn find_order_by_session(&self, session_id: &str) -> StoreResult<Option<Order>> {
        Ok(self
            .tables
            .lock()
            .orders
            .values()
            .find(|o| o.payment_session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn stale_pending_orders(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Order>> {
        let mut stale: Vec<Order> = self
            .tables
            .lock()
            .orders
            .values()
            .filter(|order| order.status == OrderStatus::Pending && order.created_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|order| order.created_at);
        Ok(stale)
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_booking(&self, booking: Booking) -> StoreResult<Booking> {
        self.tables
            .lock()
            .bookings
            .insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.tables.lock().bookings.get(&id).cloned())
    }

    async fn update_booking_status(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> StoreResult<Option<Booking>> {
        let mut tables = self.tables.lock();
        match tables.bookings.get_mut(&id) {
            Some(booking) if booking.status == from => {
                booking.status = to;
                booking.updated_at = Utc::now();
                Ok(Some(booking.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl AvailabilityStore for MemoryStore {
    async fn upsert_availability(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        status: AvailabilityStatus,
        note: Option<String>,
    ) -> StoreResult<Availability> {
        let mut tables = self.tables.lock();
        let now = Utc::now();
        let record = tables
            .availability
            .entry((provider_id, date))
            .and_modify(|existing| {
                existing.status = status;
                existing.note = note.clone();
                existing.updated_at = now;
            })
            .or_insert_with(|| Availability {
                id: Uuid::new_v4(),
                provider_id,
                date,
                status,
                note: note.clone(),
                updated_at: now,
            });
        Ok(record.clone())
    }

    async fn availability_range(
        &self,
        provider_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Availability>> {
        Ok(self
            .tables
            .lock()
            .availability
            .range((provider_id, from)..=(provider_id, to))
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn delete_availability(&self, provider_id: Uuid, date: NaiveDate) -> StoreResult<bool> {
        Ok(self
            .tables
            .lock()
            .availability
            .remove(&(provider_id, date))
            .is_some())
    }
}

#[async_trait]
impl SlotStore for MemoryStore {
    async fn activity_owner(&self, activity_id: Uuid) -> StoreResult<Option<Uuid>> {
        Ok(self.tables.lock().activities.get(&activity_id).copied())
    }

    async fn insert_slot(&self, activity_id: Uuid, new: NewSlot) -> StoreResult<ActivitySlot> {
        let mut tables = self.tables.lock();
        if !tables.activities.contains_key(&activity_id) {
            return Err(AppError::NotFound(format!(
                "Activity '{}' was not found",
                activity_id
            )));
        }
        let duplicate = tables.slots.values().any(|slot| {
            slot.activity_id == activity_id
                && slot.start_at == new.start_at
                && slot.end_at == new.end_at
        });
        if duplicate {
            return Err(AppError::Conflict(
                "A slot with the same start and end already exists".to_string(),
            ));
        }
        let now = Utc::now();
        let slot = ActivitySlot {
            id: Uuid::new_v4(),
            activity_id,
            start_at: new.start_at,
            end_at: new.end_at,
            capacity_total: new.capacity_total,
            capacity_booked: 0,
            status: SlotStatus::Open,
            note: new.note,
            created_at: now,
            updated_at: now,
        };
        tables.slots.insert(slot.id, slot.clone());
        Ok(slot)
    }

    async fn get_slot(&self, id: Uuid) -> StoreResult<Option<ActivitySlot>> {
        Ok(self.tables.lock().slots.get(&id).cloned())
    }

    async fn list_slots(&self, activity_id: Uuid) -> StoreResult<Vec<ActivitySlot>> {
        let mut slots: Vec<ActivitySlot> = self
            .tables
            .lock()
            .slots
            .values()
            .filter(|slot| slot.activity_id == activity_id)
            .cloned()
            .collect();
        slots.sort_by_key(|slot| (slot.start_at, slot.end_at));
        Ok(slots)
    }

    async fn set_slot_status(&self, id: Uuid, status: SlotStatus) -> StoreResult<ActivitySlot> {
        let mut tables = self.tables.lock();
        let slot = tables.slots.get_mut(&id).ok_or_else(|| slot_not_found(id))?;
        if let Some(refusal) = slot_status_refusal(slot, status) {
            return Err(refusal);
        }
        slot.status = status;
        slot.updated_at = Utc::now();
        Ok(slot.clone())
    }

    async fn set_slot_capacity(&self, id: Uuid, capacity_total: i32) -> StoreResult<ActivitySlot> {
        let mut tables = self.tables.lock();
        let slot = tables.slots.get_mut(&id).ok_or_else(|| slot_not_found(id))?;
        if capacity_total < slot.capacity_booked {
            return Err(AppError::Conflict(format!(
                "Capacity {} is below the {} places already booked",
                capacity_total, slot.capacity_booked
            )));
        }
        slot.capacity_total = capacity_total;
        slot.status =
            ActivitySlot::status_for_capacity(slot.status, slot.capacity_booked, capacity_total);
        slot.updated_at = Utc::now();
        Ok(slot.clone())
    }

    async fn reserve_slot(&self, id: Uuid, quantity: i32) -> StoreResult<ActivitySlot> {
        let mut tables = self.tables.lock();
        let slot = tables.slots.get_mut(&id).ok_or_else(|| slot_not_found(id))?;
        match slot.status {
            SlotStatus::Closed => {
                return Err(AppError::Conflict(format!("Slot '{}' is closed", id)));
            }
            SlotStatus::SoldOut => return Err(insufficient_slot(id, 0)),
            SlotStatus::Open => {}
        }
        if quantity > slot.remaining() {
            return Err(insufficient_slot(id, slot.remaining()));
        }
        slot.capacity_booked += quantity;
        if slot.capacity_booked == slot.capacity_total {
            slot.status = SlotStatus::SoldOut;
        }
        slot.updated_at = Utc::now();
        Ok(slot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket_type(total: i32) -> NewTicketType {
        NewTicketType {
            name: "General".to_string(),
            price: 5000,
            currency: "RON".to_string(),
            total,
        }
    }

    #[tokio::test]
    async fn test_reserve_is_all_or_nothing() {
        let store = MemoryStore::new();
        let event_id = Uuid::new_v4();
        store.register_event(event_id, Uuid::new_v4());
        let a = store.insert_ticket_type(event_id, ticket_type(10)).await.unwrap();
        let b = store.insert_ticket_type(event_id, ticket_type(2)).await.unwrap();

        let err = store
            .reserve(&[
                ReservationLine {
                    ticket_type_id: a.id,
                    quantity: 5,
                },
                ReservationLine {
                    ticket_type_id: b.id,
                    quantity: 3,
                },
            ])
            .await
            .unwrap_err();

        match err {
            AppError::InsufficientInventory { id, remaining, .. } => {
                assert_eq!(id, b.id);
                assert_eq!(remaining, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.get_ticket_type(a.id).await.unwrap().unwrap().sold, 0);
        assert_eq!(store.get_ticket_type(b.id).await.unwrap().unwrap().sold, 0);
    }

    #[tokio::test]
    async fn test_upsert_keeps_one_record_per_day() {
        let store = MemoryStore::new();
        let provider = Uuid::new_v4();
        let day = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();

        store
            .upsert_availability(provider, day, AvailabilityStatus::Busy, None)
            .await
            .unwrap();
        let second = store
            .upsert_availability(provider, day, AvailabilityStatus::Partial, Some("pm".into()))
            .await
            .unwrap();

        assert_eq!(store.availability_count(provider), 1);
        assert_eq!(second.status, AvailabilityStatus::Partial);
        assert_eq!(second.note.as_deref(), Some("pm"));
    }

    #[tokio::test]
    async fn test_reserve_slot_marks_sold_out() {
        let store = MemoryStore::new();
        let activity = Uuid::new_v4();
        store.register_activity(activity, Uuid::new_v4());
        let start = Utc::now();
        let slot = store
            .insert_slot(
                activity,
                NewSlot {
                    start_at: start,
                    end_at: start + chrono::Duration::hours(2),
                    capacity_total: 3,
                    note: None,
                },
            )
            .await
            .unwrap();

        let slot = store.reserve_slot(slot.id, 3).await.unwrap();
        assert_eq!(slot.status, SlotStatus::SoldOut);
        assert!(matches!(
            store.reserve_slot(slot.id, 1).await,
            Err(AppError::InsufficientInventory { remaining: 0, .. })
        ));
        assert!(matches!(
            store.set_slot_status(slot.id, SlotStatus::Open).await,
            Err(AppError::Conflict(_))
        ));

        let grown = store.set_slot_capacity(slot.id, 5).await.unwrap();
        assert_eq!(grown.status, SlotStatus::Open);
        assert!(matches!(
            store.set_slot_status(slot.id, SlotStatus::SoldOut).await,
            Err(AppError::Conflict(_))
        ));
        let closed = store.set_slot_status(slot.id, SlotStatus::Closed).await.unwrap();
        assert_eq!(closed.status, SlotStatus::Closed);
    }
}
