//! Use Cases Layer - Observability Orchestration
//!
//! Coordinates domain types and ports:
//! - `RetryingCheck`: per-check timeout and backoff wrapper
//! - `HealthMonitor`: concurrent fan-out under one global deadline
//! - `AuditLogger`: validation, enrichment, rate limiting, delivery
//! - `AuditTrail`, `ComplianceReporter`, `DataRetentionManager`: read side
//!   and governance over the audit store

pub mod audit_logger;
pub mod audit_trail;
pub mod compliance_reporter;
pub mod health_monitor;
pub mod rate_limiter;
pub mod retention;
pub mod retrying;

pub use audit_logger::{AuditLogger, DeliveryMode, LogOutcome};
pub use audit_trail::{AuditTrail, TrailSummary};
pub use compliance_reporter::{
  ComplianceReporter, PdpaReport, RetentionComplianceReport, SecurityReport,
};
pub use health_monitor::HealthMonitor;
pub use rate_limiter::SlidingWindowLimiter;
pub use retention::{DataRetentionManager, DeletionReceipt};
pub use retrying::{CheckPolicy, RetryingCheck};
