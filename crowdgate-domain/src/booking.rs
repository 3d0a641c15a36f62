use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Waiting for payment
    Pending,
    /// Payment successful
    Confirmed,
    /// Payment failed
    Failed,
    /// User cancelled before confirmation
    Cancelled,
    /// Payment window elapsed
    Expired,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Failed => "FAILED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(BookingStatus::Pending),
            "CONFIRMED" => Some(BookingStatus::Confirmed),
            "FAILED" => Some(BookingStatus::Failed),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            "EXPIRED" => Some(BookingStatus::Expired),
            _ => None,
        }
    }

    /// Every status except `Pending` is terminal.
    pub fn is_terminal(self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: i64,
    pub user_id: String,
    pub event_id: i64,
    pub seat_ids: Vec<String>,
    pub amount: Decimal,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Immutable after creation: `created_at` plus the payment window.
    pub expires_at: DateTime<Utc>,
}

/// Fields the caller supplies when inserting a booking; the store assigns
/// the monotonic id.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: String,
    pub event_id: i64,
    pub seat_ids: Vec<String>,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
