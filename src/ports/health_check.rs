//! Health Check Port - one probe of one dependency.

use async_trait::async_trait;

use crate::domain::health::HealthCheckResult;

/// A single named health probe.
///
/// Implementations must be cancellable at any await point: the monitor
/// aborts checks that outlive the global deadline.
#[async_trait]
pub trait HealthCheck: Send + Sync + 'static {
  /// Unique service name used as the report key.
  fn service_name(&self) -> &str;

  /// Run the probe once.
  ///
  /// An `Err` means the probe itself failed (connection refused, bad
  /// response); the retry wrapper turns it into an Unhealthy result.
  async fn perform_check(&self) -> anyhow::Result<HealthCheckResult>;
}
