use anyhow::Context;
use crowdgate_api::{app, workers, AppState};
use crowdgate_booking::BookingSaga;
use crowdgate_core::bus::EventBus;
use crowdgate_core::catalog::StaticEventCatalog;
use crowdgate_core::clock::SystemClock;
use crowdgate_core::lock_store::LockStore;
use crowdgate_core::repository::{BookingRepository, OutboxRepository, TransactionRepository};
use crowdgate_core::retry::RetryPolicy;
use crowdgate_payment::{MockPaymentGateway, PaymentEngine};
use crowdgate_reservation::{SeatLockService, TatkalInventory};
use crowdgate_store::app_config::Config;
use crowdgate_store::postgres::{PgBookingRepository, PgOutbox, PgTransactionRepository};
use crowdgate_store::{DbClient, KafkaEventBus, RedisLockStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crowdgate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Crowdgate API on port {}", config.server.port);

    let lock_store: Arc<dyn LockStore> = Arc::new(
        RedisLockStore::new(&config.redis.url).context("Failed to create Redis client")?,
    );

    let db = DbClient::new(&config.database.url)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let bus: Arc<dyn EventBus> = Arc::new(
        KafkaEventBus::new(&config.kafka.brokers, config.rules.bus_publish_retries)
            .context("Failed to create Kafka producer")?,
    );

    let bookings: Arc<dyn BookingRepository> =
        Arc::new(PgBookingRepository::new(db.pool.clone()));
    let transactions: Arc<dyn TransactionRepository> =
        Arc::new(PgTransactionRepository::new(db.pool.clone()));
    let outbox: Arc<dyn OutboxRepository> = Arc::new(PgOutbox::new(db.pool.clone()));

    let clock = Arc::new(SystemClock);
    let seat_locks = Arc::new(SeatLockService::new(
        Arc::clone(&lock_store),
        config.rules.lock_ttl(),
    ));
    let tatkal = Arc::new(TatkalInventory::new(Arc::clone(&lock_store)));

    // The catalog service owns event metadata; this placeholder answers
    // empty summaries until the remote client lands.
    let catalog = Arc::new(StaticEventCatalog::new());

    let saga = Arc::new(BookingSaga::new(
        bookings,
        Arc::clone(&seat_locks),
        catalog,
        Arc::clone(&bus),
        clock.clone(),
        config.rules.booking_expiry(),
    ));

    // Reference gateway; swap for the real adapter behind the same trait.
    let gateway = Arc::new(MockPaymentGateway::new());
    let payments = Arc::new(PaymentEngine::new(
        transactions,
        gateway,
        clock,
        config.rules.gateway_timeout(),
    ));

    let consumer_retry = RetryPolicy::new(
        config.rules.consumer_dlq_after,
        Duration::from_millis(200),
        Duration::from_secs(10),
    );
    workers::spawn_payment_worker(
        Arc::clone(&bus),
        Arc::clone(&payments),
        consumer_retry.clone(),
    );
    workers::spawn_booking_worker(Arc::clone(&bus), Arc::clone(&saga), consumer_retry);
    workers::spawn_expiry_sweeper(
        Arc::clone(&saga),
        Duration::from_secs(config.rules.expiry_sweep_interval_seconds),
    );
    workers::spawn_payment_sweeper(
        Arc::clone(&payments),
        Duration::from_secs(config.rules.expiry_sweep_interval_seconds),
    );
    workers::spawn_outbox_publisher(outbox, Arc::clone(&bus), Duration::from_secs(1));

    let app_state = AppState {
        seat_locks,
        tatkal,
        saga,
        payments,
        lock_store,
        rate_limit_per_minute: config.rules.rate_limit_per_minute,
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind listener")?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}
