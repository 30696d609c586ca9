//! Booking requests and their role-gated status transitions.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::actor::{Actor, Role};
use crate::models::booking::{
    Booking, BookingAction, BookingStatus, NewBooking, TransitionViolation,
};
use crate::services::availability::AvailabilityCalendar;
use crate::store::BookingStore;
use crate::utils::error::AppError;

pub struct BookingLifecycle {
    store: Arc<dyn BookingStore>,
    calendar: Arc<AvailabilityCalendar>,
}

fn validate_money(new: &NewBooking) -> Result<(), AppError> {
    let negative = |v: Option<Decimal>| v.map_or(false, |v| v < Decimal::ZERO);
    if negative(new.price_gross) || negative(new.fee) {
        return Err(AppError::ValidationError(
            "Price and fee cannot be negative".to_string(),
        ));
    }
    match (new.price_gross, new.fee) {
        (None, Some(_)) => Err(AppError::ValidationError(
            "A fee requires a gross price".to_string(),
        )),
        (Some(gross), Some(fee)) if fee > gross => Err(AppError::ValidationError(
            "Fee cannot exceed the gross price".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Client-side actions belong to the booking's client, provider-side ones
/// to its provider. Admins act on any booking.
fn check_party(booking: &Booking, actor: &Actor) -> Result<(), TransitionViolation> {
    let party = match actor.role {
        Role::Admin => return Ok(()),
        Role::Client => booking.user_id,
        Role::Provider => booking.provider_id,
    };
    if party != actor.id {
        return Err(TransitionViolation::NotParty { role: actor.role });
    }
    Ok(())
}

impl BookingLifecycle {
    pub fn new(store: Arc<dyn BookingStore>, calendar: Arc<AvailabilityCalendar>) -> Self {
        Self { store, calendar }
    }

    /// Creates a pending booking requested by a client, then marks the
    /// provider's day busy. The calendar write is best-effort: its failure
    /// is logged and the booking stands.
    pub async fn create_booking(
        &self,
        actor: &Actor,
        new: NewBooking,
    ) -> Result<Booking, AppError> {
        if actor.role != Role::Client {
            return Err(AppError::Forbidden(
                "Only clients can request bookings".to_string(),
            ));
        }
        let city = new.city.trim();
        if city.is_empty() {
            return Err(AppError::ValidationError("City is required".to_string()));
        }
        if actor.id == new.provider_id {
            return Err(AppError::ValidationError(
                "A provider cannot book themselves".to_string(),
            ));
        }
        validate_money(&new)?;

        let now = Utc::now();
        let booking = self
            .store
            .insert_booking(Booking {
                id: Uuid::new_v4(),
                user_id: actor.id,
                provider_id: new.provider_id,
                date: new.date,
                city: city.to_string(),
                status: BookingStatus::Pending,
                price_gross: new.price_gross,
                fee: new.fee,
                created_at: now,
                updated_at: now,
            })
            .await?;
        info!(
            booking_id = %booking.id,
            provider_id = %booking.provider_id,
            date = %booking.date,
            "Booking created"
        );

        if let Err(e) = self.calendar.mark_busy(booking.provider_id, booking.date).await {
            warn!(
                booking_id = %booking.id,
                provider_id = %booking.provider_id,
                date = %booking.date,
                error = %e,
                "Failed to mark provider busy; calendar is out of sync with bookings"
            );
        }

        Ok(booking)
    }

    pub async fn get_booking(&self, actor: &Actor, id: Uuid) -> Result<Booking, AppError> {
        let booking = self
            .store
            .get_booking(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking '{}' was not found", id)))?;
        if !actor.is_admin() && actor.id != booking.user_id && actor.id != booking.provider_id {
            return Err(AppError::Forbidden(
                "Only the parties to a booking may view it".to_string(),
            ));
        }
        Ok(booking)
    }

    /// Applies `action` for `actor`. Role is checked before party and
    /// state; the write is a compare-and-set so concurrent transitions
    /// cannot both succeed.
    pub async fn transition(
        &self,
        booking_id: Uuid,
        actor: &Actor,
        action: BookingAction,
    ) -> Result<Booking, AppError> {
        if !action.permitted_for(actor.role) {
            return Err(TransitionViolation::WrongActor {
                role: actor.role,
                action,
            }
            .into());
        }

        let booking = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Booking '{}' was not found", booking_id))
            })?;
        check_party(&booking, actor)?;

        let from = booking.status;
        let to = from.transition(actor.role, action)?;

        match self.store.update_booking_status(booking_id, from, to).await? {
            Some(updated) => {
                info!(
                    booking_id = %booking_id,
                    actor_id = %actor.id,
                    role = %actor.role,
                    from = from.as_str(),
                    to = to.as_str(),
                    "Booking transitioned"
                );
                Ok(updated)
            }
            None => {
                // Someone else moved it first; report against what it is now.
                let current = self
                    .store
                    .get_booking(booking_id)
                    .await?
                    .map(|b| b.status)
                    .unwrap_or(from);
                warn!(
                    booking_id = %booking_id,
                    expected = from.as_str(),
                    current = current.as_str(),
                    "Booking transition lost a race"
                );
                Err(TransitionViolation::WrongState {
                    from: current,
                    action,
                }
                .into())
            }
        }
    }
}
