//! Payloads exchanged over the event bus. Field names are part of the wire
//! contract shared with the notification and catalog consumers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Published by the booking saga once a PENDING booking row exists.
/// Consumed by the payment engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingCreated {
    pub booking_id: i64,
    pub user_id: String,
    pub event_id: i64,
    pub seat_ids: Vec<String>,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Published by the payment engine after a successful charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSuccess {
    pub booking_id: i64,
    pub transaction_id: Uuid,
    pub user_id: String,
    pub amount: Decimal,
    pub gateway_reference: String,
    pub timestamp: DateTime<Utc>,
}

/// Published by the payment engine after a declined charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailed {
    pub booking_id: i64,
    pub user_id: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Published by the booking saga on the PENDING -> CONFIRMED transition.
/// Consumed downstream by notification and the event catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmed {
    pub booking_id: i64,
    pub user_id: String,
    pub event_id: i64,
    pub event_name: String,
    pub event_date: String,
    pub seat_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn booking_created_uses_camel_case_keys() {
        let event = BookingCreated {
            booking_id: 1,
            user_id: "u-1".to_string(),
            event_id: 9,
            seat_ids: vec!["A1".to_string()],
            amount: Decimal::new(20000, 2),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("bookingId").is_some());
        assert!(json.get("seatIds").is_some());
        assert!(json.get("booking_id").is_none());
    }
}
