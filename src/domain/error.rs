//! Error taxonomy shared by the metrics, health and audit subsystems.
//!
//! Only two kinds are ever raised to callers at runtime:
//! - `Validation` - an audit event failed PDPA compliance (hard failure)
//! - `Configuration` - setup-time mistakes (duplicate metric, short key)
//!
//! `Timeout` and `Transient` are folded into Unhealthy health results by
//! the check wrapper; `Storage` is logged and skipped during queries.

use std::time::Duration;

use thiserror::Error;

use super::audit::compliance::ComplianceViolation;

/// Result alias for fallible observability operations.
pub type Result<T> = std::result::Result<T, ObservabilityError>;

/// Top-level error for the observability core.
#[derive(Debug, Error)]
pub enum ObservabilityError {
    /// Audit event rejected by PDPA compliance validation.
    #[error("compliance validation failed: {0}")]
    Validation(#[from] ComplianceViolation),

    /// Setup-time misconfiguration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An operation exceeded its time budget.
    #[error("{operation} timed out after {}ms", elapsed.as_millis())]
    Timeout {
        /// What was being waited on.
        operation: String,
        /// The budget that was exceeded.
        elapsed: Duration,
    },

    /// A retryable failure of an underlying probe.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Audit storage failure (missing, corrupt or unwritable record).
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<MetricError> for ObservabilityError {
    fn from(err: MetricError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Errors raised by metric primitives and the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricError {
    /// Counters only move forward.
    #[error("counter {name} cannot be decremented")]
    NegativeIncrement {
        /// Metric name.
        name: String,
    },

    /// The supplied label names differ from the declared set.
    #[error("metric {name} expects labels {expected:?}, got {actual:?}")]
    LabelMismatch {
        /// Metric name.
        name: String,
        /// Declared label names.
        expected: Vec<String>,
        /// Label names supplied by the caller.
        actual: Vec<String>,
    },

    /// A metric with this name is already registered.
    #[error("metric {0} is already registered")]
    Duplicate(String),

    /// Histogram boundaries must be finite and strictly ascending.
    #[error("metric {name} has invalid buckets: {reason}")]
    InvalidBuckets {
        /// Metric name.
        name: String,
        /// Why the bucket list was rejected.
        reason: String,
    },

    /// Summary retention window must be positive.
    #[error("metric {0} needs a positive max_age")]
    InvalidMaxAge(String),
}
