//! Audit Logger - validate, enrich, rate-limit, deliver
//!
//! Pipeline per event:
//! 1. PDPA validation (hard failure, event is never persisted)
//! 2. Host metadata enrichment under `details.host`
//! 3. Optional sliding-window rate limit (silent drop)
//! 4. Delivery: immediate store, in-process buffer, or a supervised
//!    background worker fed by a bounded channel
//!
//! Everything after step 1 is best-effort: storage failures are logged
//! and reported through `LogOutcome`, never raised.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::rate_limiter::SlidingWindowLimiter;
use super::retrying::duration_ms;
use crate::domain::audit::{
  AccessOutcome, AuditEvent, ConsultationRecord, DataOperation, LegalBasis, PdpaValidator,
  ProcessingPurpose, SecurityEventKind, SecuritySeverity,
};
use crate::domain::error::{MetricError, ObservabilityError};
use crate::domain::health::HostMetadata;
use crate::domain::metrics::{Counter, MetricRegistry};
use crate::ports::AuditStorage;

/// Upper bound on batch buffers allocated up front.
const PREALLOCATE_MAX: usize = 4096;

/// How accepted events reach storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
  /// Store inline; the caller waits for the write.
  Immediate,
  /// Append to a buffer; write the whole buffer once it holds `batch_size`.
  Buffered { batch_size: usize },
  /// Hand off to a background worker over a bounded channel.
  Background {
    capacity: usize,
    batch_size: usize,
    flush_interval: Duration,
  },
}

/// What happened to an accepted (compliant) event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
  Stored,
  Buffered,
  Queued,
  RateLimited,
  StoreFailed,
}

impl LogOutcome {
  pub const fn as_str(self) -> &'static str {
    match self {
      Self::Stored => "stored",
      Self::Buffered => "buffered",
      Self::Queued => "queued",
      Self::RateLimited => "rate_limited",
      Self::StoreFailed => "store_failed",
    }
  }
}

enum WorkerMsg {
  Event(AuditEvent),
  Flush(oneshot::Sender<usize>),
}

enum Delivery {
  Immediate,
  Buffered {
    batch_size: usize,
    buffer: Mutex<Vec<AuditEvent>>,
  },
  Background {
    tx: RwLock<Option<mpsc::Sender<WorkerMsg>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
  },
}

/// Compliance-gated audit event sink.
pub struct AuditLogger {
  storage: Arc<dyn AuditStorage>,
  validator: PdpaValidator,
  host: HostMetadata,
  limiter: Option<SlidingWindowLimiter>,
  delivery: Delivery,
  events_total: Option<Arc<Counter>>,
}

impl AuditLogger {
  /// Build a logger. `Background` mode spawns its worker, so it must be
  /// called from within a tokio runtime.
  pub fn new(
    storage: Arc<dyn AuditStorage>,
    host: HostMetadata,
    mode: DeliveryMode,
  ) -> Result<Self, ObservabilityError> {
    let delivery = match mode {
      DeliveryMode::Immediate => Delivery::Immediate,
      DeliveryMode::Buffered { batch_size } => Delivery::Buffered {
        batch_size: batch_size.max(1),
        buffer: Mutex::new(Vec::with_capacity(batch_size.clamp(1, PREALLOCATE_MAX))),
      },
      DeliveryMode::Background {
        capacity,
        batch_size,
        flush_interval,
      } => {
        if flush_interval.is_zero() {
          return Err(ObservabilityError::Configuration(
            "audit flush interval must be positive".to_string(),
          ));
        }
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(
          Arc::clone(&storage),
          rx,
          batch_size.max(1),
          flush_interval,
        ));
        Delivery::Background {
          tx: RwLock::new(Some(tx)),
          worker: Mutex::new(Some(worker)),
        }
      }
    };

    Ok(Self {
      storage,
      validator: PdpaValidator::new()?,
      host,
      limiter: None,
      delivery,
      events_total: None,
    })
  }

  #[must_use]
  pub fn with_rate_limit(mut self, limiter: SlidingWindowLimiter) -> Self {
    self.limiter = Some(limiter);
    self
  }

  #[must_use]
  pub fn with_validator(mut self, validator: PdpaValidator) -> Self {
    self.validator = validator;
    self
  }

  /// Count events into `audit_events_total{event_type,outcome}`.
  pub fn with_metrics(mut self, registry: &MetricRegistry) -> Result<Self, MetricError> {
    self.events_total = Some(registry.counter(
      "audit_events_total",
      "Audit events by type and outcome",
      &["event_type", "outcome"],
    )?);
    Ok(self)
  }

  /// Run the full pipeline for one event.
  ///
  /// Returns `Err(Validation)` only for non-compliant events.
  #[instrument(skip_all, fields(event_id = %event.event_id(), event_type = %event.event_type()))]
  pub async fn log_event(&self, mut event: AuditEvent) -> Result<LogOutcome, ObservabilityError> {
    if let Err(violation) = self.validator.validate(&event) {
      let findings: Vec<String> = violation.findings.iter().map(ToString::to_string).collect();
      warn!(findings = ?findings, "Audit event rejected by PDPA validation");
      self.count(&event, "rejected");
      return Err(violation.into());
    }

    event.enrich(&self.host);

    if let Some(limiter) = &self.limiter {
      if !limiter.try_acquire() {
        warn!(cap = limiter.capacity(), "Audit rate limit exceeded, event dropped");
        self.count(&event, LogOutcome::RateLimited.as_str());
        return Ok(LogOutcome::RateLimited);
      }
    }

    let outcome = match &self.delivery {
      Delivery::Immediate => self.store_now(&event).await,
      Delivery::Buffered { batch_size, buffer } => {
        let full = {
          let mut buffer = buffer.lock().await;
          buffer.push(event.clone());
          (buffer.len() >= *batch_size).then(|| std::mem::take(&mut *buffer))
        };
        if let Some(batch) = full {
          write_batch(self.storage.as_ref(), batch).await;
        }
        LogOutcome::Buffered
      }
      Delivery::Background { tx, .. } => {
        let sender = tx.read().unwrap_or_else(PoisonError::into_inner).clone();
        match sender {
          Some(sender) => match sender.send(WorkerMsg::Event(event.clone())).await {
            Ok(()) => LogOutcome::Queued,
            Err(_) => {
              warn!("Audit worker gone, storing inline");
              self.store_now(&event).await
            }
          },
          None => {
            debug!("Audit logger shut down, storing inline");
            self.store_now(&event).await
          }
        }
      }
    };

    self.count(&event, outcome.as_str());
    Ok(outcome)
  }

  /// Forward every pending event to storage; returns how many were written.
  pub async fn flush(&self) -> usize {
    match &self.delivery {
      Delivery::Immediate => 0,
      Delivery::Buffered { buffer, .. } => {
        let batch = std::mem::take(&mut *buffer.lock().await);
        write_batch(self.storage.as_ref(), batch).await
      }
      Delivery::Background { tx, .. } => {
        let sender = tx.read().unwrap_or_else(PoisonError::into_inner).clone();
        let Some(sender) = sender else {
          return 0;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if sender.send(WorkerMsg::Flush(ack_tx)).await.is_err() {
          return 0;
        }
        ack_rx.await.unwrap_or(0)
      }
    }
  }

  /// Drain pending events and stop the worker. Later events are stored
  /// inline.
  pub async fn shutdown(&self) {
    match &self.delivery {
      Delivery::Immediate => {}
      Delivery::Buffered { .. } => {
        let written = self.flush().await;
        info!(written, "Audit buffer drained");
      }
      Delivery::Background { tx, worker } => {
        drop(tx.write().unwrap_or_else(PoisonError::into_inner).take());
        if let Some(handle) = worker.lock().await.take() {
          if let Err(e) = handle.await {
            error!(error = %e, "Audit worker terminated abnormally");
          }
        }
      }
    }
  }

  pub async fn log_user_access(
    &self,
    correlation_id: &str,
    user_hash: &str,
    resource: &str,
    outcome: AccessOutcome,
  ) -> Result<LogOutcome, ObservabilityError> {
    self
      .log_event(AuditEvent::user_access(correlation_id, user_hash, resource, outcome))
      .await
  }

  pub async fn log_data_processing(
    &self,
    correlation_id: &str,
    user_hash: &str,
    operation: DataOperation,
    purpose: ProcessingPurpose,
    legal_basis: LegalBasis,
    record_count: u32,
  ) -> Result<LogOutcome, ObservabilityError> {
    self
      .log_event(AuditEvent::data_processing(
        correlation_id,
        user_hash,
        operation,
        purpose,
        legal_basis,
        record_count,
      ))
      .await
  }

  pub async fn log_medical_consultation(
    &self,
    correlation_id: &str,
    user_hash: &str,
    record: &ConsultationRecord,
  ) -> Result<LogOutcome, ObservabilityError> {
    self
      .log_event(AuditEvent::medical_consultation(correlation_id, user_hash, record))
      .await
  }

  pub async fn log_security_event(
    &self,
    correlation_id: &str,
    user_hash: &str,
    kind: SecurityEventKind,
    severity: SecuritySeverity,
    ip_hash: Option<&str>,
  ) -> Result<LogOutcome, ObservabilityError> {
    self
      .log_event(AuditEvent::security_event(correlation_id, user_hash, kind, severity, ip_hash))
      .await
  }

  pub async fn log_system_admin(
    &self,
    correlation_id: &str,
    admin_hash: &str,
    action: &'static str,
    resource: &'static str,
  ) -> Result<LogOutcome, ObservabilityError> {
    self
      .log_event(AuditEvent::system_admin(correlation_id, admin_hash, action, resource))
      .await
  }

  pub async fn log_compliance_check(
    &self,
    correlation_id: &str,
    check: &'static str,
    passed: bool,
    findings: u32,
  ) -> Result<LogOutcome, ObservabilityError> {
    self
      .log_event(AuditEvent::compliance_check(correlation_id, check, passed, findings))
      .await
  }

  async fn store_now(&self, event: &AuditEvent) -> LogOutcome {
    match self.storage.store(event).await {
      Ok(()) => LogOutcome::Stored,
      Err(e) => {
        error!(event_id = %event.event_id(), error = %e, "Failed to store audit event");
        LogOutcome::StoreFailed
      }
    }
  }

  fn count(&self, event: &AuditEvent, outcome: &str) {
    if let Some(counter) = &self.events_total {
      let _ = counter.inc(&[
        ("event_type", event.event_type().as_str()),
        ("outcome", outcome),
      ]);
    }
  }
}

/// Store each event in order; returns the number written.
async fn write_batch(storage: &dyn AuditStorage, batch: Vec<AuditEvent>) -> usize {
  let mut written = 0;
  for event in batch {
    match storage.store(&event).await {
      Ok(()) => written += 1,
      Err(e) => error!(event_id = %event.event_id(), error = %e, "Failed to store audit event"),
    }
  }
  written
}

async fn run_worker(
  storage: Arc<dyn AuditStorage>,
  mut rx: mpsc::Receiver<WorkerMsg>,
  batch_size: usize,
  flush_interval: Duration,
) {
  let mut batch = Vec::with_capacity(batch_size.min(PREALLOCATE_MAX));
  let mut ticker = tokio::time::interval(flush_interval);
  ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
  ticker.tick().await;
  let mut total = 0usize;

  info!(batch_size, flush_interval_ms = duration_ms(flush_interval), "Audit worker started");

  loop {
    tokio::select! {
      msg = rx.recv() => match msg {
        Some(WorkerMsg::Event(event)) => {
          batch.push(event);
          if batch.len() >= batch_size {
            total += write_batch(storage.as_ref(), std::mem::take(&mut batch)).await;
          }
        }
        Some(WorkerMsg::Flush(ack)) => {
          let written = write_batch(storage.as_ref(), std::mem::take(&mut batch)).await;
          total += written;
          let _ = ack.send(written);
        }
        None => {
          total += write_batch(storage.as_ref(), std::mem::take(&mut batch)).await;
          break;
        }
      },
      _ = ticker.tick() => {
        if !batch.is_empty() {
          total += write_batch(storage.as_ref(), std::mem::take(&mut batch)).await;
        }
      }
    }
  }

  info!(total, "Audit worker drained and stopped");
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::storage::InMemoryStorage;
  use crate::domain::audit::{SYSTEM_ACTOR, hash_identifier};
  use crate::domain::clock::ManualClock;
  use crate::ports::AuditQuery;

  fn host() -> HostMetadata {
    HostMetadata {
      hostname: "test-host".into(),
      pid: 1,
      service: "triage".into(),
      version: "0.0.0".into(),
    }
  }

  fn user() -> String {
    hash_identifier("user-1", b"salt")
  }

  #[tokio::test]
  async fn test_immediate_store_enriches_host() {
    let storage = Arc::new(InMemoryStorage::new());
    let logger = AuditLogger::new(storage.clone(), host(), DeliveryMode::Immediate).unwrap();
    let outcome = logger
      .log_user_access("c1", &user(), "consultation", AccessOutcome::Granted)
      .await
      .unwrap();
    assert_eq!(outcome, LogOutcome::Stored);

    let stored = storage.query(&AuditQuery::all()).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].details()["host"]["hostname"], "test-host");
  }

  #[tokio::test]
  async fn test_non_compliant_event_never_stored() {
    let storage = Arc::new(InMemoryStorage::new());
    let registry = MetricRegistry::new();
    let logger = AuditLogger::new(storage.clone(), host(), DeliveryMode::Immediate)
      .unwrap()
      .with_metrics(&registry)
      .unwrap();
    let event = AuditEvent::system_admin("c1", SYSTEM_ACTOR, "export", "reports")
      .with_detail("free_text", "anything");
    let err = logger.log_event(event).await.unwrap_err();
    assert!(matches!(err, ObservabilityError::Validation(_)));
    assert!(storage.is_empty().await);

    let text = registry.get("audit_events_total").unwrap().render_prometheus();
    assert!(text.contains("outcome=\"rejected\""));
  }

  #[tokio::test]
  async fn test_rate_limited_events_dropped() {
    let storage = Arc::new(InMemoryStorage::new());
    let clock = Arc::new(ManualClock::default());
    let logger = AuditLogger::new(storage.clone(), host(), DeliveryMode::Immediate)
      .unwrap()
      .with_rate_limit(SlidingWindowLimiter::per_second(1).with_clock(clock));
    let first = logger.log_compliance_check("c", "retention", true, 0).await.unwrap();
    let second = logger.log_compliance_check("c", "retention", true, 0).await.unwrap();
    assert_eq!(first, LogOutcome::Stored);
    assert_eq!(second, LogOutcome::RateLimited);
    assert_eq!(storage.len().await, 1);
  }

  #[tokio::test]
  async fn test_unbounded_batch_size_builds_and_flushes() {
    let storage = Arc::new(InMemoryStorage::new());
    let logger = AuditLogger::new(
      storage.clone(),
      host(),
      DeliveryMode::Buffered { batch_size: usize::MAX },
    )
    .unwrap();
    let outcome = logger.log_compliance_check("c", "pdpa", true, 0).await.unwrap();
    assert_eq!(outcome, LogOutcome::Buffered);
    assert_eq!(logger.flush().await, 1);
    assert_eq!(storage.len().await, 1);
  }

  #[tokio::test]
  async fn test_buffer_flushes_when_full() {
    let storage = Arc::new(InMemoryStorage::new());
    let logger =
      AuditLogger::new(storage.clone(), host(), DeliveryMode::Buffered { batch_size: 3 }).unwrap();
    for _ in 0..2 {
      logger.log_compliance_check("c", "pdpa", true, 0).await.unwrap();
    }
    assert_eq!(storage.len().await, 0);
    logger.log_compliance_check("c", "pdpa", true, 0).await.unwrap();
    assert_eq!(storage.len().await, 3);

    logger.log_compliance_check("c", "pdpa", true, 0).await.unwrap();
    assert_eq!(logger.flush().await, 1);
    assert_eq!(storage.len().await, 4);
  }

  #[tokio::test]
  async fn test_background_shutdown_drains() {
    let storage = Arc::new(InMemoryStorage::new());
    let logger = AuditLogger::new(
      storage.clone(),
      host(),
      DeliveryMode::Background {
        capacity: 16,
        batch_size: 100,
        flush_interval: Duration::from_secs(3600),
      },
    )
    .unwrap();
    for _ in 0..5 {
      let outcome = logger.log_compliance_check("c", "pdpa", true, 0).await.unwrap();
      assert_eq!(outcome, LogOutcome::Queued);
    }
    logger.shutdown().await;
    assert_eq!(storage.len().await, 5);

    let late = logger.log_compliance_check("c", "pdpa", true, 0).await.unwrap();
    assert_eq!(late, LogOutcome::Stored);
  }

  #[tokio::test]
  async fn test_background_explicit_flush() {
    let storage = Arc::new(InMemoryStorage::new());
    let logger = AuditLogger::new(
      storage.clone(),
      host(),
      DeliveryMode::Background {
        capacity: 16,
        batch_size: 100,
        flush_interval: Duration::from_secs(3600),
      },
    )
    .unwrap();
    logger.log_compliance_check("c", "pdpa", true, 0).await.unwrap();
    logger.log_compliance_check("c", "pdpa", true, 0).await.unwrap();
    assert_eq!(logger.flush().await, 2);
    assert_eq!(storage.len().await, 2);
    logger.shutdown().await;
  }
}
