use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::models::actor::Actor;
use crate::models::slot::{ActivitySlot, NewSlot, SlotStatus};
use crate::store::{slot_not_found, SlotStore};
use crate::utils::error::AppError;

/// Capacity-bounded time slots of an activity. Reservations use the same
/// conditional increment as ticket inventory.
pub struct SlotLedger {
    store: Arc<dyn SlotStore>,
}

fn validate_capacity(capacity_total: i32) -> Result<(), AppError> {
    if capacity_total <= 0 {
        return Err(AppError::ValidationError(
            "Capacity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

impl SlotLedger {
    pub fn new(store: Arc<dyn SlotStore>) -> Self {
        Self { store }
    }

    async fn authorize(&self, actor: &Actor, activity_id: Uuid) -> Result<(), AppError> {
        let owner = self
            .store
            .activity_owner(activity_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Activity '{}' was not found", activity_id))
            })?;
        if !actor.owns_or_admin(owner) {
            return Err(AppError::Forbidden(
                "Only the activity's provider or an admin may manage its slots".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn create_slot(
        &self,
        actor: &Actor,
        activity_id: Uuid,
        new: NewSlot,
    ) -> Result<ActivitySlot, AppError> {
        if new.end_at <= new.start_at {
            return Err(AppError::ValidationError(
                "Slot must end after it starts".to_string(),
            ));
        }
        validate_capacity(new.capacity_total)?;
        let new = NewSlot {
            note: new
                .note
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            ..new
        };
        self.authorize(actor, activity_id).await?;

        let slot = self.store.insert_slot(activity_id, new).await?;
        info!(
            slot_id = %slot.id,
            activity_id = %activity_id,
            capacity = slot.capacity_total,
            "Slot created"
        );
        Ok(slot)
    }

    pub async fn get_slot(&self, id: Uuid) -> Result<ActivitySlot, AppError> {
        self.store
            .get_slot(id)
            .await?
            .ok_or_else(|| slot_not_found(id))
    }

    pub async fn list_slots(&self, activity_id: Uuid) -> Result<Vec<ActivitySlot>, AppError> {
        self.store.list_slots(activity_id).await
    }

    /// The owner may close or reopen a slot at any time. `sold_out` only
    /// describes a full slot, so it cannot be set while room remains and a
    /// full slot cannot be reopened. The store checks both against the
    /// booked count in the same write.
    pub async fn set_status(
        &self,
        actor: &Actor,
        id: Uuid,
        status: SlotStatus,
    ) -> Result<ActivitySlot, AppError> {
        let slot = self.get_slot(id).await?;
        self.authorize(actor, slot.activity_id).await?;

        let updated = self.store.set_slot_status(id, status).await?;
        info!(
            slot_id = %id,
            status = updated.status.as_str(),
            "Slot status changed"
        );
        Ok(updated)
    }

    pub async fn update_capacity(
        &self,
        actor: &Actor,
        id: Uuid,
        capacity_total: i32,
    ) -> Result<ActivitySlot, AppError> {
        validate_capacity(capacity_total)?;
        let slot = self.get_slot(id).await?;
        self.authorize(actor, slot.activity_id).await?;

        let updated = self.store.set_slot_capacity(id, capacity_total).await?;
        info!(
            slot_id = %id,
            capacity = updated.capacity_total,
            booked = updated.capacity_booked,
            status = updated.status.as_str(),
            "Slot capacity changed"
        );
        Ok(updated)
    }

    pub async fn reserve(&self, id: Uuid, quantity: i32) -> Result<ActivitySlot, AppError> {
        if quantity <= 0 {
            return Err(AppError::ValidationError(
                "Quantity must be greater than zero".to_string(),
            ));
        }
        let slot = self.store.reserve_slot(id, quantity).await?;
        info!(
            slot_id = %id,
            quantity,
            booked = slot.capacity_booked,
            total = slot.capacity_total,
            "Slot places reserved"
        );
        Ok(slot)
    }
}
