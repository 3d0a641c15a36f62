//! Event bus abstraction gluing the saga, payment engine, and downstream
//! consumers together.
//!
//! Delivery is at-least-once with FIFO per partition key; exactly-once lives
//! at the application layer (idempotency keys in the payment engine,
//! status-guarded transitions in the saga), not in the broker.

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use std::fmt;
use std::pin::Pin;
use thiserror::Error;

/// The closed set of topics the core publishes and consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    BookingCreated,
    PaymentSuccess,
    PaymentFailed,
    BookingConfirmed,
}

impl Topic {
    pub const fn as_str(self) -> &'static str {
        match self {
            Topic::BookingCreated => "booking.created",
            Topic::PaymentSuccess => "payment.success",
            Topic::PaymentFailed => "payment.failed",
            Topic::BookingConfirmed => "booking.confirmed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "booking.created" => Some(Topic::BookingCreated),
            "payment.success" => Some(Topic::PaymentSuccess),
            "payment.failed" => Some(Topic::PaymentFailed),
            "booking.confirmed" => Some(Topic::BookingConfirmed),
            _ => None,
        }
    }

    /// Dead-letter companion topic where poisoned messages are parked.
    pub fn dead_letter(self) -> String {
        format!("{}.dlq", self.as_str())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("publish to '{topic}' failed: {reason}")]
    PublishFailed { topic: String, reason: String },
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// A raw message as delivered to a consumer group.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

pub type MessageStream = Pin<Box<dyn Stream<Item = Result<BusMessage, BusError>> + Send>>;

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a payload. `key` is the partition key; messages sharing a key
    /// are delivered in publish order.
    ///
    /// Topic is a plain string so dead-letter topics can be published
    /// through the same path.
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BusError>;

    /// Subscribe a consumer group to a set of topics. Each group owns an
    /// independent cursor; every group sees every message at least once.
    async fn subscribe(&self, group: &str, topics: &[Topic]) -> Result<MessageStream, BusError>;
}

/// Serialize `event` as JSON and publish it under `topic`.
pub async fn publish_json<T: Serialize + Sync>(
    bus: &dyn EventBus,
    topic: Topic,
    key: &str,
    event: &T,
) -> Result<(), BusError> {
    let payload = serde_json::to_vec(event).map_err(|e| BusError::PublishFailed {
        topic: topic.as_str().to_string(),
        reason: e.to_string(),
    })?;
    bus.publish(topic.as_str(), key, &payload).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_names_match_wire_contract() {
        assert_eq!(Topic::BookingCreated.as_str(), "booking.created");
        assert_eq!(Topic::PaymentSuccess.as_str(), "payment.success");
        assert_eq!(Topic::PaymentFailed.as_str(), "payment.failed");
        assert_eq!(Topic::BookingConfirmed.as_str(), "booking.confirmed");
        assert_eq!(Topic::PaymentFailed.dead_letter(), "payment.failed.dlq");
    }

    #[test]
    fn parse_is_the_inverse_of_as_str() {
        for topic in [
            Topic::BookingCreated,
            Topic::PaymentSuccess,
            Topic::PaymentFailed,
            Topic::BookingConfirmed,
        ] {
            assert_eq!(Topic::parse(topic.as_str()), Some(topic));
        }
        assert_eq!(Topic::parse("booking.unknown"), None);
    }
}
