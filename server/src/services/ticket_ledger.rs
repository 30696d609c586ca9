use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::models::actor::Actor;
use crate::models::ticket::{
    normalize_currency, NewTicketType, ReservationLine, TicketType, TicketTypeUpdate,
};
use crate::store::{ticket_type_not_found, TicketStore};
use crate::utils::error::AppError;

pub struct TicketLedger {
    store: Arc<dyn TicketStore>,
}

fn validate_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::ValidationError(
            "Ticket type name is required".to_string(),
        ));
    }
    Ok(name.to_string())
}

fn validate_price(price: i64) -> Result<(), AppError> {
    if price < 0 {
        return Err(AppError::ValidationError(
            "Price cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn validate_total(total: i32) -> Result<(), AppError> {
    if total <= 0 {
        return Err(AppError::ValidationError(
            "Total capacity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

impl TicketLedger {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    async fn authorize(&self, actor: &Actor, event_id: Uuid) -> Result<(), AppError> {
        let owner = self
            .store
            .event_owner(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event '{}' was not found", event_id)))?;
        if !actor.owns_or_admin(owner) {
            return Err(AppError::Forbidden(
                "Only the event's provider or an admin may manage its tickets".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn create_ticket_type(
        &self,
        actor: &Actor,
        event_id: Uuid,
        new: NewTicketType,
    ) -> Result<TicketType, AppError> {
        let new = NewTicketType {
            name: validate_name(&new.name)?,
            currency: normalize_currency(&new.currency)?,
            ..new
        };
        validate_price(new.price)?;
        validate_total(new.total)?;
        self.authorize(actor, event_id).await?;

        let ticket_type = self.store.insert_ticket_type(event_id, new).await?;
        info!(
            ticket_type_id = %ticket_type.id,
            event_id = %event_id,
            total = ticket_type.total,
            price = ticket_type.price,
            currency = %ticket_type.currency,
            "Ticket type created"
        );
        Ok(ticket_type)
    }

    pub async fn get_ticket_type(&self, id: Uuid) -> Result<TicketType, AppError> {
        self.store
            .get_ticket_type(id)
            .await?
            .ok_or_else(|| ticket_type_not_found(id))
    }

    pub async fn list_ticket_types(&self, event_id: Uuid) -> Result<Vec<TicketType>, AppError> {
        self.store.list_ticket_types(event_id).await
    }

    /// Name, price and total may change; `sold` never does here.
    pub async fn update_ticket_type(
        &self,
        actor: &Actor,
        id: Uuid,
        update: TicketTypeUpdate,
    ) -> Result<TicketType, AppError> {
        let update = TicketTypeUpdate {
            name: update.name.as_deref().map(validate_name).transpose()?,
            ..update
        };
        if let Some(price) = update.price {
            validate_price(price)?;
        }
        if let Some(total) = update.total {
            validate_total(total)?;
        }

        let current = self.get_ticket_type(id).await?;
        self.authorize(actor, current.event_id).await?;

        let updated = self.store.update_ticket_type(id, update).await?;
        info!(
            ticket_type_id = %id,
            total = updated.total,
            sold = updated.sold,
            price = updated.price,
            "Ticket type updated"
        );
        Ok(updated)
    }

    pub async fn delete_ticket_type(&self, actor: &Actor, id: Uuid) -> Result<u64, AppError> {
        let current = self.get_ticket_type(id).await?;
        self.authorize(actor, current.event_id).await?;

        let removed_items = self.store.delete_ticket_type(id).await?;
        info!(
            ticket_type_id = %id,
            removed_items,
            "Ticket type deleted"
        );
        Ok(removed_items)
    }

    /// All-or-nothing claim against several ticket types.
    pub async fn reserve(&self, lines: &[ReservationLine]) -> Result<(), AppError> {
        if lines.is_empty() {
            return Err(AppError::ValidationError(
                "Nothing to reserve".to_string(),
            ));
        }
        if let Some(line) = lines.iter().find(|line| line.quantity <= 0) {
            return Err(AppError::ValidationError(format!(
                "Quantity for ticket type '{}' must be greater than zero",
                line.ticket_type_id
            )));
        }
        self.store.reserve(lines).await
    }
}
