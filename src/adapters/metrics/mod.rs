//! Metrics and Monitoring Adapters
//!
//! Renders the metric registry as Prometheus text or JSON and serves
//! the health/metrics read API via axum 0.7.

pub mod health;
pub mod prometheus;

pub use health::{HealthServer, HealthState};
pub use prometheus::{ExportFilter, PrometheusExporter};
