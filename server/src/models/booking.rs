use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::models::actor::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "booking_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Declined,
    Canceled,
    Done,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 5] = [
        BookingStatus::Pending,
        BookingStatus::Accepted,
        BookingStatus::Declined,
        BookingStatus::Canceled,
        BookingStatus::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Declined => "declined",
            BookingStatus::Canceled => "canceled",
            BookingStatus::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Declined | BookingStatus::Canceled | BookingStatus::Done
        )
    }

    /// Applies `action` on behalf of `role`.
    ///
    /// The role check runs first, so a caller who could never perform the
    /// action is told so even when the status would also forbid it.
    pub fn transition(
        self,
        role: Role,
        action: BookingAction,
    ) -> Result<BookingStatus, TransitionViolation> {
        if !action.permitted_for(role) {
            return Err(TransitionViolation::WrongActor { role, action });
        }

        match (self, action) {
            (BookingStatus::Pending, BookingAction::Accept) => Ok(BookingStatus::Accepted),
            (BookingStatus::Pending, BookingAction::Decline) => Ok(BookingStatus::Declined),
            (BookingStatus::Pending | BookingStatus::Accepted, BookingAction::Cancel) => {
                Ok(BookingStatus::Canceled)
            }
            (BookingStatus::Accepted, BookingAction::Done) => Ok(BookingStatus::Done),
            (from, action) => Err(TransitionViolation::WrongState { from, action }),
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingAction {
    Accept,
    Decline,
    Cancel,
    Done,
}

impl BookingAction {
    pub const ALL: [BookingAction; 4] = [
        BookingAction::Accept,
        BookingAction::Decline,
        BookingAction::Cancel,
        BookingAction::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingAction::Accept => "accept",
            BookingAction::Decline => "decline",
            BookingAction::Cancel => "cancel",
            BookingAction::Done => "done",
        }
    }

    pub fn permitted_for(&self, role: Role) -> bool {
        match role {
            Role::Admin => true,
            Role::Client => matches!(self, BookingAction::Cancel),
            Role::Provider => matches!(
                self,
                BookingAction::Accept | BookingAction::Decline | BookingAction::Done
            ),
        }
    }
}

impl fmt::Display for BookingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accept" => Ok(BookingAction::Accept),
            "decline" => Ok(BookingAction::Decline),
            "cancel" => Ok(BookingAction::Cancel),
            "done" => Ok(BookingAction::Done),
            other => Err(format!("Unknown booking action '{}'", other)),
        }
    }
}

/// Why a booking transition was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionViolation {
    #[error("Action '{action}' is not allowed for your role ({role})")]
    WrongActor { role: Role, action: BookingAction },

    #[error("Only the {role} on this booking may perform that action")]
    NotParty { role: Role },

    #[error("Action '{action}' is not allowed from the current status ({from})")]
    WrongState {
        from: BookingStatus,
        action: BookingAction,
    },
}

impl TransitionViolation {
    /// `"actor"` or `"state"`, for callers choosing what to tell the user.
    pub fn constraint(&self) -> &'static str {
        match self {
            TransitionViolation::WrongActor { .. } | TransitionViolation::NotParty { .. } => {
                "actor"
            }
            TransitionViolation::WrongState { .. } => "state",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub city: String,
    pub status: BookingStatus,
    pub price_gross: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// What the provider keeps once the platform fee is taken.
    pub fn provider_payout(&self) -> Option<Decimal> {
        self.price_gross
            .map(|gross| gross - self.fee.unwrap_or(Decimal::ZERO))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub city: String,
    #[serde(default)]
    pub price_gross: Option<Decimal>,
    #[serde(default)]
    pub fee: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub provider_payout: Option<Decimal>,
}

impl From<Booking> for BookingView {
    fn from(booking: Booking) -> Self {
        let provider_payout = booking.provider_payout();
        Self {
            booking,
            provider_payout,
        }
    }
}
