//! Health Monitor - concurrent fan-out of every registered check
//!
//! `check_all` spawns one task per check and awaits them under a single
//! global deadline. Checks still pending at the deadline are aborted and
//! reported as synthetic Unhealthy results; completed checks keep their
//! real result. Dropping the round aborts every task it spawned. The
//! monitor never returns an error.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use super::retrying::{CheckPolicy, RetryingCheck, duration_ms};
use crate::domain::error::{MetricError, ObservabilityError};
use crate::domain::health::{HealthCheckResult, HealthReport, HealthStatus, aggregate};
use crate::domain::metrics::{Gauge, Histogram, MetricRegistry};
use crate::ports::HealthCheck;

const CHECK_DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Gauge + histogram fed by each round.
struct MonitorInstruments {
  status: Arc<Gauge>,
  duration: Arc<Histogram>,
}

/// Check tasks of one round, aborted when the round is dropped.
struct RoundTasks(Vec<(String, JoinHandle<(HealthCheckResult, Duration)>)>);

impl Drop for RoundTasks {
  fn drop(&mut self) {
    for (_, handle) in &self.0 {
      handle.abort();
    }
  }
}

/// Orchestrates all registered health checks.
pub struct HealthMonitor {
  checks: Vec<Arc<RetryingCheck>>,
  global_timeout: Duration,
  history_len: usize,
  history: Mutex<HashMap<String, VecDeque<HealthCheckResult>>>,
  instruments: Option<MonitorInstruments>,
}

impl HealthMonitor {
  /// Monitor with no history and no metrics.
  pub fn new(global_timeout: Duration) -> Self {
    Self {
      checks: Vec::new(),
      global_timeout,
      history_len: 0,
      history: Mutex::new(HashMap::new()),
      instruments: None,
    }
  }

  /// Keep the last `len` results per service (0 disables history).
  #[must_use]
  pub fn with_history(mut self, len: usize) -> Self {
    self.history_len = len;
    self
  }

  /// Publish `health_check_status{service}` and
  /// `health_check_duration_seconds{service}` into `registry`.
  pub fn with_metrics(mut self, registry: &MetricRegistry) -> Result<Self, MetricError> {
    let status = registry.gauge(
      "health_check_status",
      "Last health status per service (0 healthy, 1 degraded, 2 unhealthy, 3 unknown)",
      &["service"],
    )?;
    let duration = registry.histogram(
      "health_check_duration_seconds",
      "Wall time of each health check including retries",
      &["service"],
      CHECK_DURATION_BUCKETS,
    )?;
    self.instruments = Some(MonitorInstruments { status, duration });
    Ok(self)
  }

  /// Add a check under `policy`. Service names must be unique.
  pub fn register(
    &mut self,
    check: Arc<dyn HealthCheck>,
    policy: CheckPolicy,
  ) -> Result<(), ObservabilityError> {
    let name = check.service_name().to_string();
    if self.checks.iter().any(|c| c.service_name() == name) {
      return Err(ObservabilityError::Configuration(format!(
        "health check {name} is already registered"
      )));
    }
    info!(service = %name, timeout_ms = duration_ms(policy.timeout), retries = policy.retry_count, "Health check registered");
    self.checks.push(Arc::new(RetryingCheck::new(check, policy)));
    Ok(())
  }

  /// Registered service names in registration order.
  pub fn service_names(&self) -> Vec<String> {
    self
      .checks
      .iter()
      .map(|c| c.service_name().to_string())
      .collect()
  }

  pub const fn global_timeout(&self) -> Duration {
    self.global_timeout
  }

  /// Run every check concurrently under the global deadline.
  #[instrument(skip(self), fields(checks = self.checks.len()))]
  pub async fn check_all(&self) -> HealthReport {
    let deadline = Instant::now() + self.global_timeout;

    let mut tasks = RoundTasks(
      self
        .checks
        .iter()
        .map(|check| {
          let check = Arc::clone(check);
          let name = check.service_name().to_string();
          let handle = tokio::spawn(async move {
            let started = Instant::now();
            let result = check.check().await;
            (result, started.elapsed())
          });
          (name, handle)
        })
        .collect(),
    );

    let outcomes = join_all(
      tasks
        .0
        .iter_mut()
        .map(|(_, handle)| tokio::time::timeout_at(deadline, handle)),
    )
    .await;

    let mut results = Vec::with_capacity(tasks.0.len());
    for ((service, handle), outcome) in tasks.0.iter().zip(outcomes) {
      let result = match outcome {
        Ok(Ok((result, elapsed))) => {
          if let Some(m) = &self.instruments {
            let _ = m
              .duration
              .observe(elapsed.as_secs_f64(), &[("service", service.as_str())]);
          }
          result
        }
        Ok(Err(join_err)) => {
          warn!(service = %service, error = %join_err, "Health check task failed");
          HealthCheckResult::unhealthy(service.as_str(), "health check task failed")
            .with_error(join_err.to_string())
        }
        Err(_) => {
          handle.abort();
          warn!(
            service = %service,
            global_timeout_ms = duration_ms(self.global_timeout),
            "Health check exceeded global timeout"
          );
          HealthCheckResult::unhealthy(service.as_str(), "global timeout")
            .with_error(
              ObservabilityError::Timeout {
                operation: "health check round".to_string(),
                elapsed: self.global_timeout,
              }
              .to_string(),
            )
            .with_detail("global_timeout", true)
            .with_detail("global_timeout_ms", duration_ms(self.global_timeout))
        }
      };
      results.push(result);
    }

    self.record(&results);
    let report = HealthReport::new(results);
    info!(status = %report.status, checks = report.checks.len(), "Health round complete");
    report
  }

  /// Worst-of across `results`; Unknown when empty.
  pub fn calculate_overall_status(results: &[HealthCheckResult]) -> HealthStatus {
    aggregate(results.iter().map(HealthCheckResult::status))
  }

  /// Retained results for `service`, oldest first.
  pub fn history(&self, service: &str) -> Vec<HealthCheckResult> {
    self
      .history
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(service)
      .map(|ring| ring.iter().cloned().collect())
      .unwrap_or_default()
  }

  fn record(&self, results: &[HealthCheckResult]) {
    if let Some(m) = &self.instruments {
      for r in results {
        let _ = m
          .status
          .set(f64::from(r.status().severity()), &[("service", r.service())]);
      }
    }

    if self.history_len == 0 {
      return;
    }
    let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
    for r in results {
      let ring = history.entry(r.service().to_string()).or_default();
      if ring.len() == self.history_len {
        ring.pop_front();
      }
      ring.push_back(r.clone());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicBool, Ordering};

  struct Fixed(&'static str, HealthStatus);

  #[async_trait]
  impl HealthCheck for Fixed {
    fn service_name(&self) -> &str {
      self.0
    }

    async fn perform_check(&self) -> anyhow::Result<HealthCheckResult> {
      Ok(HealthCheckResult::new(self.0, self.1, "fixed"))
    }
  }

  struct Panics;

  #[async_trait]
  impl HealthCheck for Panics {
    fn service_name(&self) -> &str {
      "panics"
    }

    async fn perform_check(&self) -> anyhow::Result<HealthCheckResult> {
      panic!("probe bug")
    }
  }

  /// Sets `finished` once its sleep completes.
  struct Sleeper {
    delay: Duration,
    finished: Arc<AtomicBool>,
  }

  #[async_trait]
  impl HealthCheck for Sleeper {
    fn service_name(&self) -> &str {
      "llm_api"
    }

    async fn perform_check(&self) -> anyhow::Result<HealthCheckResult> {
      tokio::time::sleep(self.delay).await;
      self.finished.store(true, Ordering::SeqCst);
      Ok(HealthCheckResult::healthy("llm_api", "ok"))
    }
  }

  #[test]
  fn test_duplicate_registration_rejected() {
    let mut monitor = HealthMonitor::new(Duration::from_secs(1));
    monitor
      .register(Arc::new(Fixed("db", HealthStatus::Healthy)), CheckPolicy::default())
      .unwrap();
    let err = monitor
      .register(Arc::new(Fixed("db", HealthStatus::Healthy)), CheckPolicy::default())
      .unwrap_err();
    assert!(matches!(err, ObservabilityError::Configuration(_)));
  }

  #[tokio::test]
  async fn test_empty_monitor_is_unknown() {
    let monitor = HealthMonitor::new(Duration::from_secs(1));
    assert_eq!(monitor.check_all().await.status, HealthStatus::Unknown);
  }

  #[tokio::test]
  async fn test_worst_of_and_panicked_task() {
    let mut monitor = HealthMonitor::new(Duration::from_secs(1));
    monitor
      .register(Arc::new(Fixed("db", HealthStatus::Healthy)), CheckPolicy::default())
      .unwrap();
    monitor
      .register(Arc::new(Fixed("cache", HealthStatus::Degraded)), CheckPolicy::default())
      .unwrap();
    monitor.register(Arc::new(Panics), CheckPolicy::default()).unwrap();

    let report = monitor.check_all().await;
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.checks["db"].status(), HealthStatus::Healthy);
    assert_eq!(report.checks["panics"].message(), "health check task failed");
  }

  #[tokio::test(start_paused = true)]
  async fn test_dropped_round_aborts_its_checks() {
    let finished = Arc::new(AtomicBool::new(false));
    let mut monitor = HealthMonitor::new(Duration::from_secs(60));
    monitor
      .register(
        Arc::new(Sleeper {
          delay: Duration::from_secs(5),
          finished: Arc::clone(&finished),
        }),
        CheckPolicy {
          timeout: Duration::from_secs(30),
          retry_count: 1,
          ..CheckPolicy::default()
        },
      )
      .unwrap();

    let cancelled = tokio::time::timeout(Duration::from_secs(1), monitor.check_all()).await;
    assert!(cancelled.is_err());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!finished.load(Ordering::SeqCst));
  }

  #[tokio::test]
  async fn test_history_ring_and_metrics() {
    let registry = MetricRegistry::new();
    let mut monitor = HealthMonitor::new(Duration::from_secs(1))
      .with_history(2)
      .with_metrics(&registry)
      .unwrap();
    monitor
      .register(Arc::new(Fixed("cache", HealthStatus::Degraded)), CheckPolicy::default())
      .unwrap();

    for _ in 0..3 {
      monitor.check_all().await;
    }
    assert_eq!(monitor.history("cache").len(), 2);
    assert!(monitor.history("missing").is_empty());

    let text = registry.get("health_check_status").unwrap().render_prometheus();
    assert!(text.contains("health_check_status{service=\"cache\"} 1"));
  }
}
