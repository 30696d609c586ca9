use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "slot_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Open,
    Closed,
    SoldOut,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Open => "open",
            SlotStatus::Closed => "closed",
            SlotStatus::SoldOut => "sold_out",
        }
    }
}

/// A bookable time window of an activity with its own capacity.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySlot {
    pub id: Uuid,
    pub activity_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub capacity_total: i32,
    pub capacity_booked: i32,
    pub status: SlotStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActivitySlot {
    pub fn remaining(&self) -> i32 {
        self.capacity_total - self.capacity_booked
    }

    /// Status a capacity change should leave behind. Closed slots stay
    /// closed; the owner reopens them explicitly.
    pub fn status_for_capacity(current: SlotStatus, booked: i32, total: i32) -> SlotStatus {
        match current {
            SlotStatus::Closed => SlotStatus::Closed,
            _ if booked >= total => SlotStatus::SoldOut,
            _ => SlotStatus::Open,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSlot {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub capacity_total: i32,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotStatusUpdate {
    pub status: SlotStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotCapacityUpdate {
    pub capacity_total: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotReservationRequest {
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    #[serde(flatten)]
    pub slot: ActivitySlot,
    pub remaining: i32,
}

impl From<ActivitySlot> for SlotView {
    fn from(slot: ActivitySlot) -> Self {
        let remaining = slot.remaining();
        Self { slot, remaining }
    }
}
