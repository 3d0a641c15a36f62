//! Kafka-backed [`EventBus`]. Partitioning by message key gives per-booking
//! FIFO; consumer groups give each downstream service its own cursor.

use async_trait::async_trait;
use crowdgate_core::bus::{BusError, BusMessage, EventBus, MessageStream, Topic};
use crowdgate_core::retry::{retry_with_backoff, RetryPolicy};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
pub struct KafkaEventBus {
    producer: FutureProducer,
    brokers: String,
    publish_retry: RetryPolicy,
}

impl KafkaEventBus {
    pub fn new(brokers: &str, publish_retries: usize) -> Result<Self, BusError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| BusError::Transport(e.to_string()))?;

        Ok(Self {
            producer,
            brokers: brokers.to_string(),
            publish_retry: RetryPolicy::new(
                publish_retries,
                Duration::from_millis(100),
                Duration::from_secs(5),
            ),
        })
    }

    async fn send_once(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BusError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self
            .producer
            .send(record, Timeout::After(Duration::from_secs(0)))
            .await
        {
            Ok((partition, offset)) => {
                info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    topic, key, partition, offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(BusError::PublishFailed {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl EventBus for KafkaEventBus {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BusError> {
        retry_with_backoff(&self.publish_retry, || self.send_once(topic, key, payload)).await
    }

    async fn subscribe(&self, group: &str, topics: &[Topic]) -> Result<MessageStream, BusError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| BusError::SubscribeFailed(e.to_string()))?;

        let names: Vec<&str> = topics.iter().map(|t| t.as_str()).collect();
        consumer
            .subscribe(&names)
            .map_err(|e| BusError::SubscribeFailed(e.to_string()))?;

        info!("Consumer group '{}' subscribed to {:?}", group, names);

        let stream = futures::stream::unfold(consumer, |consumer| async move {
            let item = match consumer.recv().await {
                Ok(message) => Ok(BusMessage {
                    topic: message.topic().to_string(),
                    key: message
                        .key_view::<str>()
                        .and_then(|k| k.ok())
                        .unwrap_or_default()
                        .to_string(),
                    payload: message.payload().unwrap_or_default().to_vec(),
                }),
                Err(e) => Err(BusError::Transport(e.to_string())),
            };
            Some((item, consumer))
        });

        Ok(Box::pin(stream))
    }
}
