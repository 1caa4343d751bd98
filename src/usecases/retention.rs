//! Data Retention Manager - expiry detection and deletion of audit events.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use crate::domain::audit::AuditEvent;
use crate::domain::clock::{Clock, SystemClock};
use crate::ports::{AuditQuery, AuditStorage};

/// Proof of a deletion pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionReceipt {
  pub requested: usize,
  pub deleted: usize,
  pub deleted_at: DateTime<Utc>,
}

pub struct DataRetentionManager {
  storage: Arc<dyn AuditStorage>,
  clock: Arc<dyn Clock>,
}

impl DataRetentionManager {
  pub fn new(storage: Arc<dyn AuditStorage>) -> Self {
    Self {
      storage,
      clock: Arc::new(SystemClock),
    }
  }

  #[must_use]
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  /// Events strictly older than `now - retention_days`.
  pub async fn identify_expired(&self, retention_days: u32) -> anyhow::Result<Vec<AuditEvent>> {
    let cutoff = retention_cutoff(self.clock.now(), retention_days);
    let events = self
      .storage
      .query(&AuditQuery::all().until(cutoff).limit(usize::MAX))
      .await
      .context("Failed to query expired audit events")?;
    Ok(events.into_iter().filter(|e| e.timestamp() < cutoff).collect())
  }

  pub async fn delete_expired(&self, event_ids: &[String]) -> anyhow::Result<DeletionReceipt> {
    let deleted = self
      .storage
      .delete(event_ids)
      .await
      .context("Failed to delete expired audit events")?;
    Ok(DeletionReceipt {
      requested: event_ids.len(),
      deleted,
      deleted_at: self.clock.now(),
    })
  }

  /// Identify and delete in one pass.
  #[instrument(skip(self))]
  pub async fn cleanup(&self, retention_days: u32) -> anyhow::Result<DeletionReceipt> {
    let ids: Vec<String> = self
      .identify_expired(retention_days)
      .await?
      .iter()
      .map(|e| e.event_id().to_string())
      .collect();
    let receipt = self.delete_expired(&ids).await?;
    info!(
      requested = receipt.requested,
      deleted = receipt.deleted,
      "Retention cleanup complete"
    );
    Ok(receipt)
  }

  /// Run `cleanup` every `interval` until shutdown is broadcast.
  pub fn spawn_scheduled_cleanup(
    self: Arc<Self>,
    retention_days: u32,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
  ) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
      loop {
        tokio::select! {
          biased;
          _ = shutdown_rx.recv() => {
            info!("Retention scheduler received shutdown signal");
            break;
          }
          _ = ticker.tick() => {
            if let Err(e) = self.cleanup(retention_days).await {
              error!(error = %e, "Scheduled retention cleanup failed");
            }
          }
        }
      }
    })
  }
}

/// `now - retention_days`, saturating at the earliest representable instant.
pub(crate) fn retention_cutoff(now: DateTime<Utc>, retention_days: u32) -> DateTime<Utc> {
  TimeDelta::try_days(i64::from(retention_days))
    .and_then(|age| now.checked_sub_signed(age))
    .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::storage::InMemoryStorage;
  use crate::domain::clock::ManualClock;

  async fn seeded(now: DateTime<Utc>) -> Arc<InMemoryStorage> {
    let storage = Arc::new(InMemoryStorage::new());
    for days_ago in [1, 10, 40, 400] {
      let e = AuditEvent::compliance_check("c", "retention", true, 0)
        .with_timestamp(now - TimeDelta::days(days_ago));
      storage.store(&e).await.unwrap();
    }
    storage
  }

  #[tokio::test]
  async fn test_identify_and_delete() {
    let now = DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(1000);
    let storage = seeded(now).await;
    let manager = DataRetentionManager::new(storage.clone()).with_clock(Arc::new(ManualClock::new(now)));

    let expired = manager.identify_expired(30).await.unwrap();
    assert_eq!(expired.len(), 2);

    let receipt = manager.cleanup(30).await.unwrap();
    assert_eq!(receipt.requested, 2);
    assert_eq!(receipt.deleted, 2);
    assert_eq!(storage.len().await, 2);
  }

  #[tokio::test]
  async fn test_huge_retention_expires_nothing() {
    let now = DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(1000);
    let storage = seeded(now).await;
    let manager = DataRetentionManager::new(storage.clone()).with_clock(Arc::new(ManualClock::new(now)));

    assert!(manager.identify_expired(200_000_000).await.unwrap().is_empty());
    assert_eq!(manager.cleanup(u32::MAX).await.unwrap().deleted, 0);
    assert_eq!(storage.len().await, 4);
  }

  #[test]
  fn test_cutoff_saturates() {
    let now = DateTime::<Utc>::UNIX_EPOCH;
    assert_eq!(retention_cutoff(now, 30), now - TimeDelta::days(30));
    assert_eq!(retention_cutoff(now, u32::MAX), DateTime::<Utc>::MIN_UTC);
  }

  #[tokio::test(start_paused = true)]
  async fn test_scheduler_stops_on_shutdown() {
    let now = Utc::now();
    let storage = seeded(now).await;
    let manager = Arc::new(DataRetentionManager::new(storage.clone()));
    let (tx, rx) = broadcast::channel(1);
    let handle = manager.spawn_scheduled_cleanup(30, Duration::from_secs(60), rx);

    // first tick fires immediately
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(storage.len().await, 2);

    tx.send(()).unwrap();
    handle.await.unwrap();
  }
}
