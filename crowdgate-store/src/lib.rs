pub mod app_config;
pub mod database;
pub mod kafka;
pub mod memory;
pub mod postgres;
pub mod redis_store;

pub use database::DbClient;
pub use kafka::KafkaEventBus;
pub use redis_store::RedisLockStore;
