use chrono::NaiveDate;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::models::actor::Actor;
use crate::models::availability::{AvailabilityStatus, AvailabilityUpdate, CalendarDay};
use crate::store::AvailabilityStore;
use crate::utils::error::AppError;

const MAX_RANGE_DAYS: i64 = 366;
const MAX_NOTE_CHARS: usize = 500;

/// Per-provider, per-day calendar. A day without a record is free.
pub struct AvailabilityCalendar {
    store: Arc<dyn AvailabilityStore>,
}

fn authorize(actor: &Actor, provider_id: Uuid) -> Result<(), AppError> {
    if !actor.owns_or_admin(provider_id) {
        return Err(AppError::Forbidden(
            "Only the provider or an admin may edit this calendar".to_string(),
        ));
    }
    Ok(())
}

fn normalize_note(note: Option<String>) -> Result<Option<String>, AppError> {
    let note = note
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    if let Some(n) = &note {
        if n.chars().count() > MAX_NOTE_CHARS {
            return Err(AppError::ValidationError(format!(
                "Note cannot exceed {} characters",
                MAX_NOTE_CHARS
            )));
        }
    }
    Ok(note)
}

impl AvailabilityCalendar {
    pub fn new(store: Arc<dyn AvailabilityStore>) -> Self {
        Self { store }
    }

    pub async fn set_availability(
        &self,
        actor: &Actor,
        provider_id: Uuid,
        date: NaiveDate,
        update: AvailabilityUpdate,
    ) -> Result<CalendarDay, AppError> {
        authorize(actor, provider_id)?;
        let note = normalize_note(update.note)?;
        let record = self
            .store
            .upsert_availability(provider_id, date, update.status, note)
            .await?;
        info!(
            provider_id = %provider_id,
            date = %date,
            status = ?record.status,
            "Availability set"
        );
        Ok(record.into())
    }

    /// Marks the day busy on the provider's behalf. Used when a booking is
    /// created.
    pub async fn mark_busy(&self, provider_id: Uuid, date: NaiveDate) -> Result<(), AppError> {
        self.store
            .upsert_availability(provider_id, date, AvailabilityStatus::Busy, None)
            .await?;
        Ok(())
    }

    /// Every day in `from..=to`, filling unrecorded days with the free
    /// default.
    pub async fn get(
        &self,
        provider_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CalendarDay>, AppError> {
        if from > to {
            return Err(AppError::ValidationError(
                "Range start must not be after its end".to_string(),
            ));
        }
        if (to - from).num_days() >= MAX_RANGE_DAYS {
            return Err(AppError::ValidationError(format!(
                "Range cannot span more than {} days",
                MAX_RANGE_DAYS
            )));
        }

        let mut records = self
            .store
            .availability_range(provider_id, from, to)
            .await?
            .into_iter()
            .peekable();

        let mut days = Vec::new();
        for date in from.iter_days().take_while(|d| *d <= to) {
            match records.next_if(|r| r.date == date) {
                Some(record) => days.push(record.into()),
                None => days.push(CalendarDay::free(date)),
            }
        }
        Ok(days)
    }

    /// Resets the day to the implicit default.
    pub async fn clear(
        &self,
        actor: &Actor,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<CalendarDay, AppError> {
        authorize(actor, provider_id)?;
        if self.store.delete_availability(provider_id, date).await? {
            info!(provider_id = %provider_id, date = %date, "Availability cleared");
        }
        Ok(CalendarDay::free(date))
    }
}
