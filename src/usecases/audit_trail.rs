//! Audit Trail - read-side reconstruction of sessions and user activity.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::audit::{AuditEvent, AuditEventType};
use crate::ports::{AuditQuery, AuditStorage};

/// Condensed view of every event sharing one correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrailSummary {
  /// Correlation id the trail was built for.
  pub correlation_id: String,
  /// Events in the trail.
  pub event_count: usize,
  /// Earliest event.
  pub start: DateTime<Utc>,
  /// Latest event.
  pub end: DateTime<Utc>,
  /// `end - start` in milliseconds.
  pub duration_ms: i64,
  /// Distinct event types seen.
  pub event_types: BTreeSet<AuditEventType>,
  /// Actions in timestamp order.
  pub actions: Vec<String>,
}

impl TrailSummary {
  /// Summarize timestamp-sorted events; `None` when there are none.
  pub fn from_events(correlation_id: &str, events: &[AuditEvent]) -> Option<Self> {
    let first = events.first()?;
    let last = events.last()?;
    Some(Self {
      correlation_id: correlation_id.to_string(),
      event_count: events.len(),
      start: first.timestamp(),
      end: last.timestamp(),
      duration_ms: (last.timestamp() - first.timestamp()).num_milliseconds(),
      event_types: events.iter().map(AuditEvent::event_type).collect(),
      actions: events.iter().map(|e| e.action().to_string()).collect(),
    })
  }
}

pub struct AuditTrail {
  storage: Arc<dyn AuditStorage>,
}

impl AuditTrail {
  pub fn new(storage: Arc<dyn AuditStorage>) -> Self {
    Self { storage }
  }

  /// Summary of one logical request/session.
  pub async fn generate_trail_summary(
    &self,
    correlation_id: &str,
  ) -> anyhow::Result<Option<TrailSummary>> {
    let events = self
      .storage
      .query(&AuditQuery::all().correlation_id(correlation_id).limit(usize::MAX))
      .await
      .context("Failed to query audit trail")?;
    Ok(TrailSummary::from_events(correlation_id, &events))
  }

  /// Every event recorded for one hashed user since `since`, oldest first.
  pub async fn user_activity(
    &self,
    user_hash: &str,
    since: DateTime<Utc>,
  ) -> anyhow::Result<Vec<AuditEvent>> {
    self
      .storage
      .query(&AuditQuery::all().user_hash(user_hash).since(since).limit(usize::MAX))
      .await
      .context("Failed to query user activity")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::storage::InMemoryStorage;
  use chrono::Duration;

  fn event(t: i64, kind: AuditEventType, action: &str) -> AuditEvent {
    AuditEvent::new(kind, "session-1", "system", action, "r")
      .with_timestamp(DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(t))
  }

  #[tokio::test]
  async fn test_trail_summary_orders_actions() {
    let storage = Arc::new(InMemoryStorage::new());
    for e in [
      event(20, AuditEventType::MedicalConsultation, "symptom_assessment"),
      event(5, AuditEventType::UserAccess, "access"),
      event(12, AuditEventType::DataProcessing, "data_collection"),
    ] {
      storage.store(&e).await.unwrap();
    }
    let trail = AuditTrail::new(storage);
    let summary = trail.generate_trail_summary("session-1").await.unwrap().unwrap();
    assert_eq!(summary.event_count, 3);
    assert_eq!(summary.duration_ms, 15_000);
    assert_eq!(summary.actions, vec!["access", "data_collection", "symptom_assessment"]);
    assert_eq!(summary.event_types.len(), 3);
  }

  #[tokio::test]
  async fn test_unknown_correlation_is_none() {
    let trail = AuditTrail::new(Arc::new(InMemoryStorage::new()));
    assert!(trail.generate_trail_summary("nope").await.unwrap().is_none());
  }
}
