//! Background tasks: event consumers for the saga pipeline, the expiry and
//! payment sweepers, and the outbox publisher.
//!
//! Consumers process their group's stream one message at a time, which
//! preserves per-partition order. A message that keeps failing after the
//! retry budget is parked on its dead-letter topic instead of blocking the
//! partition.

use crowdgate_booking::BookingSaga;
use crowdgate_core::bus::{BusMessage, EventBus, Topic};
use crowdgate_core::repository::OutboxRepository;
use crowdgate_core::retry::{retry_with_backoff, RetryPolicy};
use crowdgate_domain::events::{BookingCreated, PaymentFailed, PaymentSuccess};
use crowdgate_payment::PaymentEngine;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const PAYMENT_GROUP: &str = "payment-service";
const BOOKING_GROUP: &str = "booking-service";

/// Consume `booking.created` and run the idempotent charge.
pub fn spawn_payment_worker(
    bus: Arc<dyn EventBus>,
    payments: Arc<PaymentEngine>,
    retry: RetryPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = match bus.subscribe(PAYMENT_GROUP, &[Topic::BookingCreated]).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Payment worker failed to subscribe: {}", e);
                return;
            }
        };
        info!("Payment worker started, listening to bookings...");

        while let Some(item) = stream.next().await {
            let msg = match item {
                Ok(msg) => msg,
                Err(e) => {
                    error!("Bus error in payment worker: {}", e);
                    continue;
                }
            };

            let event: BookingCreated = match serde_json::from_slice(&msg.payload) {
                Ok(event) => event,
                Err(e) => {
                    // Poisoned payloads must not block the partition
                    error!("Undecodable message on {}: {}", msg.topic, e);
                    dead_letter(bus.as_ref(), &msg).await;
                    continue;
                }
            };

            info!(
                "Received BookingCreated: bookingId={}, amount={}",
                event.booking_id, event.amount
            );

            let outcome = retry_with_backoff(&retry, || {
                payments.process(event.booking_id, &event.user_id, event.amount)
            })
            .await;

            if let Err(e) = outcome {
                error!(
                    "Error processing payment for booking: bookingId={}, parking to DLQ: {}",
                    event.booking_id, e
                );
                dead_letter(bus.as_ref(), &msg).await;
            }
        }
    })
}

/// Consume payment results and drive the saga transitions. "Booking not
/// found" is retried with backoff (the payment result can outrun booking
/// row visibility) before the message is parked.
pub fn spawn_booking_worker(
    bus: Arc<dyn EventBus>,
    saga: Arc<BookingSaga>,
    retry: RetryPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = match bus
            .subscribe(BOOKING_GROUP, &[Topic::PaymentSuccess, Topic::PaymentFailed])
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                error!("Booking worker failed to subscribe: {}", e);
                return;
            }
        };
        info!("Booking worker started, listening to payment results...");

        while let Some(item) = stream.next().await {
            let msg = match item {
                Ok(msg) => msg,
                Err(e) => {
                    error!("Bus error in booking worker: {}", e);
                    continue;
                }
            };

            match Topic::parse(&msg.topic) {
                Some(Topic::PaymentSuccess) => {
                    let event: PaymentSuccess = match serde_json::from_slice(&msg.payload) {
                        Ok(event) => event,
                        Err(e) => {
                            error!("Undecodable message on {}: {}", msg.topic, e);
                            dead_letter(bus.as_ref(), &msg).await;
                            continue;
                        }
                    };
                    info!(
                        "Received PaymentSuccess: bookingId={}, transactionId={}",
                        event.booking_id, event.transaction_id
                    );
                    let outcome = retry_with_backoff(&retry, || {
                        saga.on_payment_success(event.booking_id)
                    })
                    .await;
                    if let Err(e) = outcome {
                        error!(
                            "Failed to confirm booking: bookingId={}, parking to DLQ: {}",
                            event.booking_id, e
                        );
                        dead_letter(bus.as_ref(), &msg).await;
                    }
                }
                Some(Topic::PaymentFailed) => {
                    let event: PaymentFailed = match serde_json::from_slice(&msg.payload) {
                        Ok(event) => event,
                        Err(e) => {
                            error!("Undecodable message on {}: {}", msg.topic, e);
                            dead_letter(bus.as_ref(), &msg).await;
                            continue;
                        }
                    };
                    info!(
                        "Received PaymentFailed: bookingId={}, reason={}",
                        event.booking_id, event.reason
                    );
                    let outcome = retry_with_backoff(&retry, || {
                        saga.on_payment_failed(event.booking_id, &event.reason)
                    })
                    .await;
                    if let Err(e) = outcome {
                        error!(
                            "Failed to process payment failure: bookingId={}, parking to DLQ: {}",
                            event.booking_id, e
                        );
                        dead_letter(bus.as_ref(), &msg).await;
                    }
                }
                _ => {
                    warn!("Unexpected topic in booking worker: {}", msg.topic);
                }
            }
        }
    })
}

/// Periodic PENDING-booking expiry, the TTL safety net for the saga.
pub fn spawn_expiry_sweeper(saga: Arc<BookingSaga>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match saga.expire_sweep().await {
                Ok(0) => {}
                Ok(count) => info!("Expiry sweep transitioned {} bookings", count),
                Err(e) => error!("Expiry sweep failed: {}", e),
            }
        }
    })
}

/// Periodic resolution of transactions stuck in PENDING after a gateway
/// deadline.
pub fn spawn_payment_sweeper(payments: Arc<PaymentEngine>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match payments.resolve_stalled().await {
                Ok(0) => {}
                Ok(count) => info!("Payment sweep resolved {} stalled transactions", count),
                Err(e) => error!("Payment sweep failed: {}", e),
            }
        }
    })
}

/// Drain the outbox to the bus. A record is only marked published after the
/// bus accepted it, so a crash anywhere in between replays the record.
pub fn spawn_outbox_publisher(
    outbox: Arc<dyn OutboxRepository>,
    bus: Arc<dyn EventBus>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;

            let records = match outbox.fetch_unpublished(100).await {
                Ok(records) => records,
                Err(e) => {
                    error!("Outbox fetch failed: {}", e);
                    continue;
                }
            };

            for record in records {
                let payload = match serde_json::to_vec(&record.payload) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!("Outbox record {} not serializable: {}", record.id, e);
                        continue;
                    }
                };

                match bus
                    .publish(&record.topic, &record.partition_key, &payload)
                    .await
                {
                    Ok(()) => {
                        if let Err(e) = outbox.mark_published(record.id).await {
                            // Will be re-published next tick; consumers are
                            // idempotent, so the duplicate is harmless.
                            warn!("Failed to mark outbox record {}: {}", record.id, e);
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Outbox publish failed, will retry next tick: id={}, error={}",
                            record.id, e
                        );
                        break;
                    }
                }
            }
        }
    })
}

async fn dead_letter(bus: &dyn EventBus, msg: &BusMessage) {
    let topic = format!("{}.dlq", msg.topic);
    if let Err(e) = bus.publish(&topic, &msg.key, &msg.payload).await {
        error!("Failed to park message on {}: {}", topic, e);
    }
}
