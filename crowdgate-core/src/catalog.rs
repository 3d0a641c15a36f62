//! Read-only view of the external event catalog. The catalog service owns
//! event metadata; the saga only needs a name and date to enrich the
//! confirmation event for downstream consumers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Default)]
pub struct EventSummary {
    pub name: String,
    pub date: String,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait EventCatalog: Send + Sync {
    async fn event_summary(&self, event_id: i64) -> Result<Option<EventSummary>, CatalogError>;
}

/// Process-local catalog seeded at startup; stands in for the remote
/// catalog service in tests and single-node deployments.
#[derive(Debug, Default)]
pub struct StaticEventCatalog {
    events: Mutex<HashMap<i64, EventSummary>>,
}

impl StaticEventCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, event_id: i64, name: &str, date: &str) {
        self.events.lock().unwrap().insert(
            event_id,
            EventSummary {
                name: name.to_string(),
                date: date.to_string(),
            },
        );
    }
}

#[async_trait]
impl EventCatalog for StaticEventCatalog {
    async fn event_summary(&self, event_id: i64) -> Result<Option<EventSummary>, CatalogError> {
        Ok(self.events.lock().unwrap().get(&event_id).cloned())
    }
}
