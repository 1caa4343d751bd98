//! Audit event record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::health::HostMetadata;

/// Sentinel identity for events raised by the platform itself.
pub const SYSTEM_ACTOR: &str = "system";

/// Sentinel identity for unauthenticated callers.
pub const ANONYMOUS_ACTOR: &str = "anonymous";

/// Category of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    UserAccess,
    DataProcessing,
    MedicalConsultation,
    SecurityEvent,
    SystemAdmin,
    ComplianceCheck,
}

impl AuditEventType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserAccess => "user_access",
            Self::DataProcessing => "data_processing",
            Self::MedicalConsultation => "medical_consultation",
            Self::SecurityEvent => "security_event",
            Self::SystemAdmin => "system_admin",
            Self::ComplianceCheck => "compliance_check",
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One security- or compliance-relevant event.
///
/// Fields are read-only outside the crate. Identity fields always carry
/// hashes (see [`hash_identifier`]), never raw identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    event_id: String,
    event_type: AuditEventType,
    correlation_id: String,
    user_id_hash: String,
    action: String,
    resource: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    details: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ip_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_agent_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl AuditEvent {
    /// New event stamped with a fresh v4 id and the current time.
    pub fn new(
        event_type: AuditEventType,
        correlation_id: impl Into<String>,
        user_id_hash: impl Into<String>,
        action: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type,
            correlation_id: correlation_id.into(),
            user_id_hash: user_id_hash.into(),
            action: action.into(),
            resource: resource.into(),
            timestamp: Utc::now(),
            details: BTreeMap::new(),
            ip_hash: None,
            user_agent_hash: None,
            error: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_ip_hash(mut self, ip_hash: impl Into<String>) -> Self {
        self.ip_hash = Some(ip_hash.into());
        self
    }

    #[must_use]
    pub fn with_user_agent_hash(mut self, user_agent_hash: impl Into<String>) -> Self {
        self.user_agent_hash = Some(user_agent_hash.into());
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Override the timestamp (imports, backfills, tests).
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach host metadata under `details.host`. Runs after validation.
    pub(crate) fn enrich(&mut self, host: &HostMetadata) {
        self.details.insert(
            "host".to_string(),
            serde_json::to_value(host).unwrap_or(Value::Null),
        );
    }

    /// Unique v4 id.
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Event category.
    pub const fn event_type(&self) -> AuditEventType {
        self.event_type
    }

    /// Request or session correlation id.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Hashed subject, or a sentinel actor.
    pub fn user_id_hash(&self) -> &str {
        &self.user_id_hash
    }

    /// What was done.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// What it was done to.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// When the event happened.
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Structured details, including `host` once enriched.
    pub const fn details(&self) -> &BTreeMap<String, Value> {
        &self.details
    }

    /// String detail by key.
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(Value::as_str)
    }

    /// Hashed client IP.
    pub fn ip_hash(&self) -> Option<&str> {
        self.ip_hash.as_deref()
    }

    /// Hashed user agent.
    pub fn user_agent_hash(&self) -> Option<&str> {
        self.user_agent_hash.as_deref()
    }

    /// Error attached to a failed operation.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Keyed one-way hash of an identifier (HMAC-SHA256, lowercase hex).
///
/// Callers hash user ids, IPs and user agents with a deployment salt
/// before anything reaches the audit API.
pub fn hash_identifier(raw: &str, salt: &[u8]) -> String {
    let mac = hmac_sha256::HMAC::mac(raw.as_bytes(), salt);
    mac.iter().map(|b| format!("{b:02x}")).collect()
}
