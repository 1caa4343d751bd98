//! Audit Storage Port - persistence for validated audit events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::audit::{AuditEvent, AuditEventType};

/// Result cap applied when a query does not set one.
pub const DEFAULT_QUERY_LIMIT: usize = 1000;

/// Filter over stored audit events. All set fields must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditQuery {
  /// Inclusive lower bound on the event timestamp.
  pub start: Option<DateTime<Utc>>,
  /// Inclusive upper bound on the event timestamp.
  pub end: Option<DateTime<Utc>>,
  pub event_type: Option<AuditEventType>,
  pub correlation_id: Option<String>,
  pub user_hash: Option<String>,
  /// Maximum number of events returned.
  pub limit: usize,
}

impl Default for AuditQuery {
  fn default() -> Self {
    Self {
      start: None,
      end: None,
      event_type: None,
      correlation_id: None,
      user_hash: None,
      limit: DEFAULT_QUERY_LIMIT,
    }
  }
}

impl AuditQuery {
  /// Match everything, up to the default limit.
  pub fn all() -> Self {
    Self::default()
  }

  #[must_use]
  pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
    self.start = Some(start);
    self.end = Some(end);
    self
  }

  #[must_use]
  pub fn since(mut self, start: DateTime<Utc>) -> Self {
    self.start = Some(start);
    self
  }

  #[must_use]
  pub fn until(mut self, end: DateTime<Utc>) -> Self {
    self.end = Some(end);
    self
  }

  #[must_use]
  pub fn event_type(mut self, event_type: AuditEventType) -> Self {
    self.event_type = Some(event_type);
    self
  }

  #[must_use]
  pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
    self.correlation_id = Some(correlation_id.into());
    self
  }

  #[must_use]
  pub fn user_hash(mut self, user_hash: impl Into<String>) -> Self {
    self.user_hash = Some(user_hash.into());
    self
  }

  #[must_use]
  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = limit;
    self
  }

  /// Whether a single event passes every filter.
  pub fn matches(&self, event: &AuditEvent) -> bool {
    self.start.is_none_or(|s| event.timestamp() >= s)
      && self.end.is_none_or(|e| event.timestamp() <= e)
      && self.event_type.is_none_or(|t| event.event_type() == t)
      && self
        .correlation_id
        .as_deref()
        .is_none_or(|c| event.correlation_id() == c)
      && self
        .user_hash
        .as_deref()
        .is_none_or(|u| event.user_id_hash() == u)
  }

  /// Filter, order by timestamp ascending, truncate to `limit`.
  pub fn apply<I: IntoIterator<Item = AuditEvent>>(&self, events: I) -> Vec<AuditEvent> {
    let mut matched: Vec<AuditEvent> = events.into_iter().filter(|e| self.matches(e)).collect();
    matched.sort_by_key(AuditEvent::timestamp);
    matched.truncate(self.limit);
    matched
  }
}

/// Persistence for audit events.
///
/// Implementations serialize writes within the process; they are not
/// required to be safe across processes sharing one backing store.
#[async_trait]
pub trait AuditStorage: Send + Sync + 'static {
  /// Persist one event.
  async fn store(&self, event: &AuditEvent) -> anyhow::Result<()>;

  /// Events matching `query`, sorted by timestamp, at most `query.limit`.
  ///
  /// Unreadable records are skipped, not reported as errors.
  async fn query(&self, query: &AuditQuery) -> anyhow::Result<Vec<AuditEvent>>;

  /// Delete events by id; returns how many were removed.
  async fn delete(&self, event_ids: &[String]) -> anyhow::Result<usize>;
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  fn at(secs: i64, correlation: &str) -> AuditEvent {
    AuditEvent::new(AuditEventType::UserAccess, correlation, "system", "access", "r")
      .with_timestamp(DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(secs))
  }

  #[test]
  fn test_default_limit() {
    assert_eq!(AuditQuery::all().limit, 1000);
  }

  #[test]
  fn test_apply_filters_sorts_truncates() {
    let events = vec![at(30, "a"), at(10, "a"), at(20, "b"), at(5, "a")];
    let query = AuditQuery::all().correlation_id("a").limit(2);
    let out = query.apply(events);
    let secs: Vec<i64> = out.iter().map(|e| e.timestamp().timestamp()).collect();
    assert_eq!(secs, vec![5, 10]);
  }

  #[test]
  fn test_time_bounds_inclusive() {
    let epoch = DateTime::<Utc>::UNIX_EPOCH;
    let query = AuditQuery::all().between(epoch + Duration::seconds(10), epoch + Duration::seconds(20));
    assert!(query.matches(&at(10, "x")));
    assert!(query.matches(&at(20, "x")));
    assert!(!query.matches(&at(21, "x")));
  }
}
