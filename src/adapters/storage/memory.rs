//! In-memory audit store.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::audit::AuditEvent;
use crate::ports::{AuditQuery, AuditStorage};

/// `AuditStorage` over a vector. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl AuditStorage for InMemoryStorage {
    async fn store(&self, event: &AuditEvent) -> Result<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
        let events = self.events.read().await;
        Ok(query.apply(events.iter().cloned()))
    }

    async fn delete(&self, event_ids: &[String]) -> Result<usize> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|e| !event_ids.iter().any(|id| id == e.event_id()));
        Ok(before - events.len())
    }
}
