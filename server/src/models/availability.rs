use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "availability_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityStatus {
    #[default]
    Free,
    Partial,
    Busy,
}

/// Stored calendar entry. Days without one are implicitly free.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub status: AvailabilityStatus,
    pub note: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityUpdate {
    pub status: AvailabilityStatus,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub status: AvailabilityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CalendarDay {
    pub fn free(date: NaiveDate) -> Self {
        Self {
            date,
            status: AvailabilityStatus::Free,
            note: None,
        }
    }
}

impl From<Availability> for CalendarDay {
    fn from(record: Availability) -> Self {
        Self {
            date: record.date,
            status: record.status,
            note: record.note,
        }
    }
}
