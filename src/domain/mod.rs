//! Domain layer - metric primitives, health model, audit records.
//!
//! Pure types with no I/O. Time is read through the `Clock` trait so
//! windowed behavior (summaries, rate limits, retention) is testable.

pub mod audit;
pub mod clock;
pub mod error;
pub mod health;
pub mod metrics;

pub use audit::{AuditEvent, AuditEventType, ComplianceViolation, PdpaValidator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{MetricError, ObservabilityError, Result};
pub use health::{HealthCheckResult, HealthReport, HealthStatus, HostMetadata, aggregate};
pub use metrics::{Counter, Gauge, Histogram, Metric, MetricKind, MetricRegistry, Summary};
