//! End-to-end reservation pipeline over the in-memory adapters: seat locks
//! and Tatkal counters, the booking saga, the idempotent payment engine,
//! the outbox publisher, and both consumer workers.

use chrono::Utc;
use crowdgate_api::workers;
use crowdgate_booking::BookingSaga;
use crowdgate_core::bus::{publish_json, EventBus, Topic};
use crowdgate_core::catalog::StaticEventCatalog;
use crowdgate_core::clock::{Clock, ManualClock};
use crowdgate_core::lock_store::LockStore;
use crowdgate_core::repository::{
    BookingRepository, OutboxRepository, TransactionRepository,
};
use crowdgate_core::retry::RetryPolicy;
use crowdgate_domain::booking::{Booking, BookingStatus};
use crowdgate_domain::events::{BookingConfirmed, BookingCreated, PaymentSuccess};
use crowdgate_domain::transaction::TransactionStatus;
use crowdgate_payment::{MockPaymentGateway, PaymentEngine};
use crowdgate_reservation::{SeatLockService, TatkalInventory};
use crowdgate_store::memory::{
    MemoryBookingRepository, MemoryEventBus, MemoryLockStore, MemoryTransactionRepository,
};
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

struct Pipeline {
    locks: Arc<SeatLockService>,
    tatkal: Arc<TatkalInventory>,
    saga: Arc<BookingSaga>,
    transactions: Arc<MemoryTransactionRepository>,
    gateway: Arc<MockPaymentGateway>,
    bus: Arc<MemoryEventBus>,
    clock: Arc<ManualClock>,
}

/// Assemble the full pipeline. With `spawn_workers` off, events sit on the
/// bus untouched so tests can drive the saga by hand.
fn pipeline(gateway: MockPaymentGateway, spawn_workers: bool) -> Pipeline {
    let lock_store = Arc::new(MemoryLockStore::new());
    let locks = Arc::new(SeatLockService::new(
        Arc::clone(&lock_store) as Arc<dyn LockStore>,
        Duration::from_secs(600),
    ));
    let tatkal = Arc::new(TatkalInventory::new(lock_store as Arc<dyn LockStore>));

    let bus = Arc::new(MemoryEventBus::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let catalog = Arc::new(StaticEventCatalog::new());
    catalog.register(1, "Arena Night", "2026-09-01");

    let bookings = Arc::new(MemoryBookingRepository::new());
    let transactions = Arc::new(MemoryTransactionRepository::new());
    let gateway = Arc::new(gateway);

    let saga = Arc::new(BookingSaga::new(
        bookings as Arc<dyn BookingRepository>,
        Arc::clone(&locks),
        catalog,
        Arc::clone(&bus) as Arc<dyn EventBus>,
        Arc::clone(&clock) as Arc<dyn Clock>,
        Duration::from_secs(600),
    ));
    let payments = Arc::new(PaymentEngine::new(
        Arc::clone(&transactions) as Arc<dyn TransactionRepository>,
        Arc::clone(&gateway) as Arc<dyn crowdgate_core::gateway::PaymentGateway>,
        Arc::clone(&clock) as Arc<dyn Clock>,
        Duration::from_secs(5),
    ));

    if spawn_workers {
        workers::spawn_payment_worker(
            Arc::clone(&bus) as Arc<dyn EventBus>,
            Arc::clone(&payments),
            RetryPolicy::immediate(3),
        );
        workers::spawn_booking_worker(
            Arc::clone(&bus) as Arc<dyn EventBus>,
            Arc::clone(&saga),
            RetryPolicy::immediate(3),
        );
        workers::spawn_outbox_publisher(
            Arc::clone(&transactions) as Arc<dyn OutboxRepository>,
            Arc::clone(&bus) as Arc<dyn EventBus>,
            Duration::from_millis(10),
        );
    }

    Pipeline {
        locks,
        tatkal,
        saga,
        transactions,
        gateway,
        bus,
        clock,
    }
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {}", what);
}

async fn lock_and_book(p: &Pipeline, user: &str, seats: &[&str], amount: Decimal) -> Booking {
    let seats: Vec<String> = seats.iter().map(|s| s.to_string()).collect();
    assert!(p.locks.try_lock_many(1, &seats, user).await.unwrap());
    p.saga.create_booking(user, 1, seats, amount).await.unwrap()
}

#[tokio::test]
async fn tatkal_flash_sale_never_oversells() {
    let p = pipeline(MockPaymentGateway::approving(), false);
    p.tatkal.initialize(200, 500).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10_000 {
        let tatkal = Arc::clone(&p.tatkal);
        handles.push(tokio::spawn(
            async move { tatkal.try_reserve(200).await.unwrap() },
        ));
    }

    let mut successes = 0;
    let mut failures = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        } else {
            failures += 1;
        }
    }

    assert_eq!(successes, 500);
    assert_eq!(failures, 9_500);
    assert_eq!(p.tatkal.remaining(200).await.unwrap(), 0);
    assert!(p.tatkal.is_sold_out(200).await.unwrap());
}

#[tokio::test]
async fn hot_seat_has_exactly_one_winner() {
    let p = pipeline(MockPaymentGateway::approving(), false);

    let mut handles = Vec::new();
    for i in 0..10_000 {
        let locks = Arc::clone(&p.locks);
        handles.push(tokio::spawn(async move {
            locks
                .try_lock(1, "VIP1", &format!("user-{}", i))
                .await
                .unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert!(p.locks.owner(1, "VIP1").await.unwrap().is_some());
}

#[tokio::test]
async fn reentrant_locking_collapses_to_one_lock() {
    let p = pipeline(MockPaymentGateway::approving(), false);

    let mut handles = Vec::new();
    for _ in 0..100 {
        let locks = Arc::clone(&p.locks);
        handles.push(tokio::spawn(async move {
            locks.try_lock(1, "D1", "u").await.unwrap()
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    assert_eq!(p.locks.owner(1, "D1").await.unwrap().as_deref(), Some("u"));
    assert!(p.locks.release(1, "D1", "u").await.unwrap());
    assert!(!p.locks.is_locked(1, "D1").await.unwrap());
}

#[tokio::test]
async fn successful_payment_confirms_booking_end_to_end() {
    let p = pipeline(MockPaymentGateway::approving(), true);
    let booking = lock_and_book(&p, "u-1", &["A1", "A2"], Decimal::new(200, 0)).await;
    assert_eq!(booking.status, BookingStatus::Pending);

    let saga = Arc::clone(&p.saga);
    eventually("booking confirmed", move || {
        let saga = Arc::clone(&saga);
        async move {
            saga.get(booking.id, "u-1")
                .await
                .map(|b| b.status == BookingStatus::Confirmed)
                .unwrap_or(false)
        }
    })
    .await;

    // Terminal transition released the seat locks
    assert!(!p.locks.is_locked(1, "A1").await.unwrap());
    assert!(!p.locks.is_locked(1, "A2").await.unwrap());

    // Exactly one SUCCESS transaction, one gateway charge
    let rows = p.transactions.list_for_booking(booking.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, TransactionStatus::Success);
    assert_eq!(p.gateway.charge_count(), 1);

    // Downstream consumers observed the confirmation
    let confirmed = p.bus.published("booking.confirmed");
    assert_eq!(confirmed.len(), 1);
    let event: BookingConfirmed = serde_json::from_slice(&confirmed[0].payload).unwrap();
    assert_eq!(event.booking_id, booking.id);
    assert_eq!(event.event_name, "Arena Night");
}

#[tokio::test]
async fn declined_payment_fails_booking_and_frees_seats() {
    let p = pipeline(MockPaymentGateway::declining(), true);
    let booking = lock_and_book(&p, "u-1", &["A1"], Decimal::new(200, 0)).await;

    let saga = Arc::clone(&p.saga);
    eventually("booking failed", move || {
        let saga = Arc::clone(&saga);
        async move {
            saga.get(booking.id, "u-1")
                .await
                .map(|b| b.status == BookingStatus::Failed)
                .unwrap_or(false)
        }
    })
    .await;

    // The seat is immediately lockable by a different user
    assert!(p.locks.try_lock(1, "A1", "u-2").await.unwrap());

    let rows = p.transactions.list_for_booking(booking.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, TransactionStatus::Failed);
    assert!(p.bus.published("booking.confirmed").is_empty());
}

#[tokio::test]
async fn unpaid_booking_expires_and_releases_locks() {
    // No workers: the payment never happens, only the sweep acts
    let p = pipeline(MockPaymentGateway::approving(), false);
    let booking = lock_and_book(&p, "u-1", &["A1"], Decimal::new(200, 0)).await;

    p.clock.advance(chrono::Duration::seconds(601));
    assert_eq!(p.saga.expire_sweep().await.unwrap(), 1);

    let expired = p.saga.get(booking.id, "u-1").await.unwrap();
    assert_eq!(expired.status, BookingStatus::Expired);
    assert!(!p.locks.is_locked(1, "A1").await.unwrap());
}

#[tokio::test]
async fn duplicate_booking_created_charges_once() {
    let p = pipeline(MockPaymentGateway::approving(), true);
    let booking = lock_and_book(&p, "u-1", &["A1"], Decimal::new(200, 0)).await;

    // Redeliver the same announcement, as an at-least-once bus may
    let duplicate = BookingCreated {
        booking_id: booking.id,
        user_id: booking.user_id.clone(),
        event_id: booking.event_id,
        seat_ids: booking.seat_ids.clone(),
        amount: booking.amount,
        timestamp: booking.created_at,
    };
    publish_json(
        p.bus.as_ref(),
        Topic::BookingCreated,
        &booking.id.to_string(),
        &duplicate,
    )
    .await
    .unwrap();

    let saga = Arc::clone(&p.saga);
    eventually("booking confirmed", move || {
        let saga = Arc::clone(&saga);
        async move {
            saga.get(booking.id, "u-1")
                .await
                .map(|b| b.status == BookingStatus::Confirmed)
                .unwrap_or(false)
        }
    })
    .await;
    // Let the duplicate drain through the worker too
    tokio::time::sleep(Duration::from_millis(100)).await;

    let rows = p.transactions.list_for_booking(booking.id).await.unwrap();
    assert_eq!(rows.len(), 1, "one transaction despite duplicate delivery");
    assert_eq!(p.gateway.charge_count(), 1, "gateway charged exactly once");
}

#[tokio::test]
async fn undecodable_message_is_parked_not_blocking() {
    let p = pipeline(MockPaymentGateway::approving(), true);

    p.bus
        .publish("booking.created", "junk", b"{not json")
        .await
        .unwrap();

    let bus = Arc::clone(&p.bus);
    eventually("poison message parked", move || {
        let bus = Arc::clone(&bus);
        async move { !bus.published("booking.created.dlq").is_empty() }
    })
    .await;

    // The partition keeps flowing after the poison message
    let booking = lock_and_book(&p, "u-1", &["A1"], Decimal::new(200, 0)).await;
    let saga = Arc::clone(&p.saga);
    eventually("booking confirmed after poison", move || {
        let saga = Arc::clone(&saga);
        async move {
            saga.get(booking.id, "u-1")
                .await
                .map(|b| b.status == BookingStatus::Confirmed)
                .unwrap_or(false)
        }
    })
    .await;
}

#[tokio::test]
async fn payment_result_without_booking_is_parked_after_retries() {
    let p = pipeline(MockPaymentGateway::approving(), true);

    let orphan = PaymentSuccess {
        booking_id: 777,
        transaction_id: uuid::Uuid::new_v4(),
        user_id: "u-x".to_string(),
        amount: Decimal::new(200, 0),
        gateway_reference: "pg_ref_dead".to_string(),
        timestamp: Utc::now(),
    };
    publish_json(p.bus.as_ref(), Topic::PaymentSuccess, "777", &orphan)
        .await
        .unwrap();

    let bus = Arc::clone(&p.bus);
    eventually("orphan payment parked", move || {
        let bus = Arc::clone(&bus);
        async move { !bus.published("payment.success.dlq").is_empty() }
    })
    .await;
}
