//! Probe Ports - raw inputs behind the concrete health checks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Low-level access to one backing dependency (database, cache).
#[async_trait]
pub trait DependencyProbe: Send + Sync + 'static {
  /// Open (or borrow) a connection.
  async fn connect(&self) -> anyhow::Result<()>;

  /// Trivial request/response exchange on an open connection.
  async fn round_trip(&self) -> anyhow::Result<()>;
}

/// Host resource utilization, each in percent (0-100).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
  pub cpu_percent: f64,
  pub memory_percent: f64,
  pub disk_percent: f64,
}

/// Source of host resource utilization samples.
#[async_trait]
pub trait ResourceSampler: Send + Sync + 'static {
  async fn sample(&self) -> anyhow::Result<ResourceUsage>;
}

/// State of one circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
  Closed,
  HalfOpen,
  Open,
}

/// Registry of the process's circuit breakers.
pub trait CircuitBreakerSource: Send + Sync + 'static {
  /// Current `(name, state)` of every breaker.
  fn breaker_states(&self) -> Vec<(String, BreakerState)>;
}
