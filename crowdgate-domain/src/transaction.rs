use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Charge initiated, gateway outcome unknown
    Pending,
    /// Charge captured by the gateway
    Success,
    /// Charge rejected by the gateway
    Failed,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TransactionStatus::Pending),
            "SUCCESS" => Some(TransactionStatus::Success),
            "FAILED" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub booking_id: i64,
    pub user_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: TransactionStatus,
    /// Present iff status is SUCCESS.
    pub gateway_reference: Option<String>,
    /// Present iff status is FAILED.
    pub failure_reason: Option<String>,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Deterministic key for the unique index; duplicate deliveries of the
    /// same booking converge on one row.
    pub fn idempotency_key_for(booking_id: i64, user_id: &str) -> String {
        format!("booking_{}_user_{}", booking_id, user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_is_deterministic() {
        assert_eq!(
            Transaction::idempotency_key_for(42, "u-7"),
            "booking_42_user_u-7"
        );
        assert_eq!(
            Transaction::idempotency_key_for(42, "u-7"),
            Transaction::idempotency_key_for(42, "u-7")
        );
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Success,
            TransactionStatus::Failed,
        ] {
            assert_eq!(TransactionStatus::parse(status.as_str()), Some(status));
        }
    }
}
