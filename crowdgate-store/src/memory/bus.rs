use async_trait::async_trait;
use crowdgate_core::bus::{BusError, BusMessage, EventBus, MessageStream, Topic};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::mpsc;

struct GroupSub {
    topics: HashSet<String>,
    sender: mpsc::UnboundedSender<BusMessage>,
}

struct Inner {
    /// Full publish log, in order. Subscribers joining late replay it first,
    /// mirroring `auto.offset.reset = earliest`.
    log: Vec<BusMessage>,
    groups: HashMap<String, GroupSub>,
}

/// Channel-backed [`EventBus`]. One global publish order (so per-key FIFO
/// holds a fortiori), every consumer group gets its own cursor.
pub struct MemoryEventBus {
    inner: Mutex<Inner>,
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                log: Vec::new(),
                groups: HashMap::new(),
            }),
        }
    }

    /// Everything published so far under `topic`, dead-letter topics
    /// included. Test-support accessor.
    pub fn published(&self, topic: &str) -> Vec<BusMessage> {
        let inner = self.inner.lock().unwrap();
        inner
            .log
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BusError> {
        let message = BusMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_vec(),
        };

        let mut inner = self.inner.lock().unwrap();
        inner.log.push(message.clone());
        // Dropped receivers just mean the group went away; nothing to do.
        for group in inner.groups.values() {
            if group.topics.contains(topic) {
                let _ = group.sender.send(message.clone());
            }
        }
        Ok(())
    }

    async fn subscribe(&self, group: &str, topics: &[Topic]) -> Result<MessageStream, BusError> {
        let topics: HashSet<String> = topics.iter().map(|t| t.as_str().to_string()).collect();
        let (sender, receiver) = mpsc::unbounded_channel();

        {
            let mut inner = self.inner.lock().unwrap();
            // Replay history before going live; a fresh group starts from
            // the earliest offset.
            for message in &inner.log {
                if topics.contains(&message.topic) {
                    let _ = sender.send(message.clone());
                }
            }
            inner.groups.insert(
                group.to_string(),
                GroupSub {
                    topics,
                    sender,
                },
            );
        }

        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|message| (Ok(message), receiver))
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn groups_receive_independent_copies() {
        let bus = MemoryEventBus::new();
        let mut first = bus
            .subscribe("group-a", &[Topic::BookingCreated])
            .await
            .unwrap();
        let mut second = bus
            .subscribe("group-b", &[Topic::BookingCreated])
            .await
            .unwrap();

        bus.publish("booking.created", "1", b"payload")
            .await
            .unwrap();

        let a = first.next().await.unwrap().unwrap();
        let b = second.next().await.unwrap().unwrap();
        assert_eq!(a.payload, b"payload");
        assert_eq!(b.key, "1");
    }

    #[tokio::test]
    async fn late_subscriber_replays_from_earliest() {
        let bus = MemoryEventBus::new();
        bus.publish("payment.success", "7", b"first").await.unwrap();
        bus.publish("payment.success", "7", b"second")
            .await
            .unwrap();

        let mut stream = bus
            .subscribe("late", &[Topic::PaymentSuccess])
            .await
            .unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().payload, b"first");
        assert_eq!(stream.next().await.unwrap().unwrap().payload, b"second");
    }

    #[tokio::test]
    async fn publish_order_is_preserved_per_key() {
        let bus = MemoryEventBus::new();
        let mut stream = bus
            .subscribe("g", &[Topic::PaymentSuccess, Topic::PaymentFailed])
            .await
            .unwrap();

        bus.publish("payment.success", "42", b"a").await.unwrap();
        bus.publish("payment.failed", "42", b"b").await.unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap().topic, "payment.success");
        assert_eq!(stream.next().await.unwrap().unwrap().topic, "payment.failed");
    }
}
