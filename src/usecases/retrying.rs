//! Retrying Check - timeout and backoff around any `HealthCheck`
//!
//! Attempts run sequentially. Each attempt is awaited under the
//! per-attempt timeout; a failed or timed-out non-final attempt sleeps
//! `min(base * 2^attempt, max)` before the next one. The first attempt
//! that produces a result wins. When every attempt fails, the final
//! result is Unhealthy and carries the last error plus the policy that
//! governed the check.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::error::ObservabilityError;
use crate::domain::health::HealthCheckResult;
use crate::ports::HealthCheck;

/// Per-check timeout and retry parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckPolicy {
  /// Budget for one attempt.
  pub timeout: Duration,
  /// Total attempts (treated as at least 1).
  pub retry_count: u32,
  /// Base of the exponential backoff.
  pub backoff_base: Duration,
  /// Upper bound on any single backoff sleep.
  pub backoff_max: Duration,
}

impl Default for CheckPolicy {
  fn default() -> Self {
    Self {
      timeout: Duration::from_secs(5),
      retry_count: 3,
      backoff_base: Duration::from_millis(100),
      backoff_max: Duration::from_secs(2),
    }
  }
}

impl CheckPolicy {
  /// Number of attempts actually made.
  pub fn attempts(&self) -> u32 {
    self.retry_count.max(1)
  }

  /// Sleep after the failed attempt with 0-based index `attempt`.
  pub fn backoff(&self, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    self.backoff_base.saturating_mul(factor).min(self.backoff_max)
  }
}

/// Wraps a check with the timeout/retry policy.
///
/// Implements `HealthCheck` itself, so wrappers compose.
pub struct RetryingCheck {
  inner: Arc<dyn HealthCheck>,
  policy: CheckPolicy,
}

impl RetryingCheck {
  pub fn new(inner: Arc<dyn HealthCheck>, policy: CheckPolicy) -> Self {
    Self { inner, policy }
  }

  pub const fn policy(&self) -> &CheckPolicy {
    &self.policy
  }

  /// Run the check to completion. Never fails; failures become Unhealthy.
  pub async fn check(&self) -> HealthCheckResult {
    let service = self.inner.service_name();
    let attempts = self.policy.attempts();
    let mut last_error = String::new();
    let mut timed_out = false;

    for attempt in 0..attempts {
      match tokio::time::timeout(self.policy.timeout, self.inner.perform_check()).await {
        Ok(Ok(result)) => {
          if attempt > 0 {
            debug!(service, attempt, "Health check recovered after retry");
          }
          return result;
        }
        Ok(Err(e)) => {
          timed_out = false;
          last_error = ObservabilityError::Transient(format!("{e:#}")).to_string();
          warn!(service, attempt, error = %e, "Health check attempt failed");
        }
        Err(_) => {
          timed_out = true;
          last_error = ObservabilityError::Timeout {
            operation: format!("health check {service}"),
            elapsed: self.policy.timeout,
          }
          .to_string();
          warn!(
            service,
            attempt,
            timeout_ms = duration_ms(self.policy.timeout),
            "Health check attempt timed out"
          );
        }
      }

      if attempt + 1 < attempts {
        tokio::time::sleep(self.policy.backoff(attempt)).await;
      }
    }

    HealthCheckResult::unhealthy(
      service,
      format!("check failed after {attempts} attempt(s): {last_error}"),
    )
    .with_error(last_error)
    .with_detail("timeout_ms", duration_ms(self.policy.timeout))
    .with_detail("retry_count", self.policy.retry_count)
    .with_detail("attempts", attempts)
    .with_detail("timed_out", timed_out)
  }
}

#[async_trait]
impl HealthCheck for RetryingCheck {
  fn service_name(&self) -> &str {
    self.inner.service_name()
  }

  async fn perform_check(&self) -> anyhow::Result<HealthCheckResult> {
    Ok(self.check().await)
  }
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
  u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
