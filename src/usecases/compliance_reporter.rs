//! Compliance Reporter - PDPA, security and retention reports over the
//! audit store.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::audit::{AuditEvent, AuditEventType, DataOperation, SecurityEventKind};
use crate::domain::clock::{Clock, SystemClock};
use crate::ports::{AuditQuery, AuditStorage};
use crate::usecases::retention::retention_cutoff;

/// Personal-data handling within a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdpaReport {
  /// Window start, inclusive.
  pub start: DateTime<Utc>,
  /// Window end, inclusive.
  pub end: DateTime<Utc>,
  /// `DataProcessing` events recording a collection.
  pub data_collection_events: usize,
  /// `DataProcessing` events recording processing.
  pub data_processing_events: usize,
  /// Distinct lawful bases cited in the window.
  pub legal_bases: BTreeSet<String>,
}

/// Security incidents within a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityReport {
  /// Window start, inclusive.
  pub start: DateTime<Utc>,
  /// Window end, inclusive.
  pub end: DateTime<Utc>,
  /// Failed authentication attempts.
  pub failed_auth_count: usize,
  /// Requests refused by rate limiting.
  pub rate_limit_exceeded_count: usize,
  /// Every security event in the window, oldest first.
  pub incidents: Vec<AuditEvent>,
}

/// Whether anything outlived the retention window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionComplianceReport {
  pub retention_days: u32,
  pub cutoff: DateTime<Utc>,
  pub expired_events: usize,
  pub compliant: bool,
}

pub struct ComplianceReporter {
  storage: Arc<dyn AuditStorage>,
  clock: Arc<dyn Clock>,
}

impl ComplianceReporter {
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

  pub async fn pdpa_report(
    &self,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> anyhow::Result<PdpaReport> {
    let events = self
      .window(start, end, AuditEventType::DataProcessing)
      .await
      .context("Failed to query data processing events")?;

    let count = |op: DataOperation| events.iter().filter(|e| e.action() == op.as_str()).count();
    Ok(PdpaReport {
      start,
      end,
      data_collection_events: count(DataOperation::Collection),
      data_processing_events: count(DataOperation::Processing),
      legal_bases: events
        .iter()
        .filter_map(|e| e.detail_str("legal_basis"))
        .map(ToString::to_string)
        .collect(),
    })
  }

  pub async fn security_report(
    &self,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> anyhow::Result<SecurityReport> {
    let incidents = self
      .window(start, end, AuditEventType::SecurityEvent)
      .await
      .context("Failed to query security events")?;

    let count = |kind: SecurityEventKind| {
      incidents
        .iter()
        .filter(|e| e.action() == kind.as_str())
        .count()
    };
    Ok(SecurityReport {
      start,
      end,
      failed_auth_count: count(SecurityEventKind::FailedAuth),
      rate_limit_exceeded_count: count(SecurityEventKind::RateLimitExceeded),
      incidents,
    })
  }

  /// Non-compliant when any event is older than `now - retention_days`.
  pub async fn retention_compliance(
    &self,
    retention_days: u32,
  ) -> anyhow::Result<RetentionComplianceReport> {
    let cutoff = retention_cutoff(self.clock.now(), retention_days);
    let expired = self
      .storage
      .query(&AuditQuery::all().until(cutoff).limit(usize::MAX))
      .await
      .context("Failed to query expired events")?
      .into_iter()
      .filter(|e| e.timestamp() < cutoff)
      .count();
    Ok(RetentionComplianceReport {
      retention_days,
      cutoff,
      expired_events: expired,
      compliant: expired == 0,
    })
  }

  async fn window(
    &self,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    event_type: AuditEventType,
  ) -> anyhow::Result<Vec<AuditEvent>> {
    self
      .storage
      .query(
        &AuditQuery::all()
          .between(start, end)
          .event_type(event_type)
          .limit(usize::MAX),
      )
      .await
  }
}
