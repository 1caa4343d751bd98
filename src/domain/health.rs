//! Health status, check results and aggregated reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Health of one service, ordered by severity.
///
/// `Healthy < Degraded < Unhealthy < Unknown`; aggregation takes the max.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Dependency answered normally.
    Healthy,
    /// Answered, but slow or near a limit.
    Degraded,
    /// Failed, timed out or refused.
    Unhealthy,
    /// No result yet, or nothing registered.
    Unknown,
}

impl HealthStatus {
    /// Numeric severity, used for the status gauge.
    pub const fn severity(self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Degraded => 1,
            Self::Unhealthy => 2,
            Self::Unknown => 3,
        }
    }

    /// Lowercase wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worst status by severity; `Unknown` for an empty input.
pub fn aggregate<I: IntoIterator<Item = HealthStatus>>(statuses: I) -> HealthStatus {
    statuses.into_iter().max().unwrap_or(HealthStatus::Unknown)
}

/// Outcome of one health check. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    service: String,
    status: HealthStatus,
    message: String,
    timestamp: DateTime<Utc>,
    details: BTreeMap<String, Value>,
    error: Option<String>,
}

impl HealthCheckResult {
    /// Build a result with an explicit status.
    pub fn new(service: impl Into<String>, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            status,
            message: message.into(),
            timestamp: Utc::now(),
            details: BTreeMap::new(),
            error: None,
        }
    }

    /// Healthy result.
    pub fn healthy(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(service, HealthStatus::Healthy, message)
    }

    /// Degraded result.
    pub fn degraded(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(service, HealthStatus::Degraded, message)
    }

    /// Unhealthy result.
    pub fn unhealthy(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(service, HealthStatus::Unhealthy, message)
    }

    /// Attach a detail entry (construction-time only).
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Attach the error that caused this result.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Service this result belongs to.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Reported status.
    pub const fn status(&self) -> HealthStatus {
        self.status
    }

    /// Short operator-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// When the result was built.
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Structured check details.
    pub const fn details(&self) -> &BTreeMap<String, Value> {
        &self.details
    }

    /// Underlying error, when the check failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Host identity attached to detailed reports and audit enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostMetadata {
    /// Machine hostname, `unknown` when unavailable.
    pub hostname: String,
    /// Process id.
    pub pid: u32,
    /// Configured service name.
    pub service: String,
    /// Crate version.
    pub version: String,
}

impl HostMetadata {
    /// Describe the current process.
    pub fn current(service: &str) -> Self {
        Self {
            hostname: sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string()),
            pid: std::process::id(),
            service: service.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Aggregated outcome of one `check_all` round.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Worst-of across all results.
    pub status: HealthStatus,
    /// When the round finished.
    pub timestamp: DateTime<Utc>,
    /// Results keyed by service name.
    pub checks: BTreeMap<String, HealthCheckResult>,
}

impl HealthReport {
    /// Build a report, computing the overall status.
    pub fn new(results: Vec<HealthCheckResult>) -> Self {
        let status = aggregate(results.iter().map(HealthCheckResult::status));
        let checks = results
            .into_iter()
            .map(|r| (r.service().to_string(), r))
            .collect();
        Self {
            status,
            timestamp: Utc::now(),
            checks,
        }
    }

    /// Whether a consuming HTTP layer should answer service-unavailable.
    pub fn is_unavailable(&self) -> bool {
        self.status == HealthStatus::Unhealthy
    }

    /// Health read API body.
    ///
    /// The detailed form adds per-check `details`/`error` and a `host` object.
    pub fn to_json(&self, detailed: Option<&HostMetadata>) -> Value {
        let checks: serde_json::Map<String, Value> = self
            .checks
            .iter()
            .map(|(service, result)| {
                let mut entry = json!({
                    "status": result.status(),
                    "message": result.message(),
                    "timestamp": result.timestamp().to_rfc3339(),
                });
                if detailed.is_some() {
                    entry["details"] = json!(result.details());
                    if let Some(error) = result.error() {
                        entry["error"] = json!(error);
                    }
                }
                (service.clone(), entry)
            })
            .collect();

        let mut body = json!({
            "status": self.status,
            "timestamp": self.timestamp.to_rfc3339(),
            "checks": checks,
        });
        if let Some(host) = detailed {
            body["host"] = json!(host);
        }
        body
    }
}
