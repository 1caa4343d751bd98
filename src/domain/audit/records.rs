//! Typed audit write API.
//!
//! Each constructor accepts only pre-categorized values (enums, counts,
//! booleans, durations). Free text never enters an audit record through
//! these entry points.

use serde::{Deserialize, Serialize};

use super::event::{AuditEvent, AuditEventType, SYSTEM_ACTOR};

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }
    };
}

wire_enum!(
    /// Result of an access attempt.
    AccessOutcome { Granted => "granted", Denied => "denied" }
);

wire_enum!(
    /// Whether personal data was collected or processed.
    DataOperation { Collection => "data_collection", Processing => "data_processing" }
);

wire_enum!(
    /// Why personal data was handled.
    ProcessingPurpose {
        Triage => "triage",
        Consultation => "consultation",
        FacilityLookup => "facility_lookup",
        Analytics => "analytics",
        Support => "support",
    }
);

wire_enum!(
    /// PDPA lawful basis for processing.
    LegalBasis {
        Consent => "consent",
        Contract => "contract",
        LegalObligation => "legal_obligation",
        VitalInterest => "vital_interest",
        PublicTask => "public_task",
        LegitimateInterest => "legitimate_interest",
    }
);

wire_enum!(
    /// Triage urgency assigned by the rule engine.
    UrgencyLevel { Low => "low", Medium => "medium", High => "high", Emergency => "emergency" }
);

wire_enum!(
    /// Security-relevant event kind.
    SecurityEventKind {
        FailedAuth => "failed_auth",
        RateLimitExceeded => "rate_limit_exceeded",
        AccessDenied => "access_denied",
        SuspiciousActivity => "suspicious_activity",
    }
);

wire_enum!(
    /// Severity of a security event.
    SecuritySeverity { Low => "low", Medium => "medium", High => "high", Critical => "critical" }
);

/// Structured summary of one medical consultation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsultationRecord {
    /// Category label from the triage taxonomy (e.g. `respiratory`).
    pub symptom_category: &'static str,
    /// Number of symptoms reported.
    pub symptom_count: u32,
    /// Urgency assigned by triage.
    pub urgency: UrgencyLevel,
    /// Consultation wall time.
    pub duration_ms: u64,
    /// Whether a recommendation was returned.
    pub recommendation_given: bool,
    /// Whether the user was referred to emergency care.
    pub emergency_referral: bool,
}

impl AuditEvent {
    /// Access to a resource, granted or denied.
    pub fn user_access(
        correlation_id: &str,
        user_hash: &str,
        resource: &str,
        outcome: AccessOutcome,
    ) -> Self {
        Self::new(AuditEventType::UserAccess, correlation_id, user_hash, "access", resource)
            .with_detail("outcome", outcome.as_str())
    }

    /// Personal-data collection or processing with its purpose and lawful basis.
    pub fn data_processing(
        correlation_id: &str,
        user_hash: &str,
        operation: DataOperation,
        purpose: ProcessingPurpose,
        legal_basis: LegalBasis,
        record_count: u32,
    ) -> Self {
        Self::new(
            AuditEventType::DataProcessing,
            correlation_id,
            user_hash,
            operation.as_str(),
            "personal_data",
        )
        .with_detail("purpose", purpose.as_str())
        .with_detail("legal_basis", legal_basis.as_str())
        .with_detail("record_count", record_count)
    }

    /// Structured consultation summary; no symptom text.
    pub fn medical_consultation(
        correlation_id: &str,
        user_hash: &str,
        record: &ConsultationRecord,
    ) -> Self {
        Self::new(
            AuditEventType::MedicalConsultation,
            correlation_id,
            user_hash,
            "symptom_assessment",
            "consultation",
        )
        .with_detail("symptom_category", record.symptom_category)
        .with_detail("symptom_count", record.symptom_count)
        .with_detail("urgency", record.urgency.as_str())
        .with_detail("duration_ms", record.duration_ms)
        .with_detail("recommendation_given", record.recommendation_given)
        .with_detail("emergency_referral", record.emergency_referral)
    }

    /// Security incident, optionally tied to a hashed IP.
    pub fn security_event(
        correlation_id: &str,
        user_hash: &str,
        kind: SecurityEventKind,
        severity: SecuritySeverity,
        ip_hash: Option<&str>,
    ) -> Self {
        let event = Self::new(
            AuditEventType::SecurityEvent,
            correlation_id,
            user_hash,
            kind.as_str(),
            "security",
        )
        .with_detail("severity", severity.as_str());
        match ip_hash {
            Some(ip) => event.with_ip_hash(ip),
            None => event,
        }
    }

    /// Administrative action by a hashed operator.
    pub fn system_admin(correlation_id: &str, admin_hash: &str, action: &'static str, resource: &'static str) -> Self {
        Self::new(AuditEventType::SystemAdmin, correlation_id, admin_hash, action, resource)
    }

    /// Outcome of an automated compliance check, recorded as the system actor.
    pub fn compliance_check(correlation_id: &str, check: &'static str, passed: bool, findings: u32) -> Self {
        Self::new(AuditEventType::ComplianceCheck, correlation_id, SYSTEM_ACTOR, check, "compliance")
            .with_detail("passed", passed)
            .with_detail("findings", findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_processing_fields() {
        let event = AuditEvent::data_processing(
            "c1",
            SYSTEM_ACTOR,
            DataOperation::Collection,
            ProcessingPurpose::Triage,
            LegalBasis::Consent,
            3,
        );
        assert_eq!(event.action(), "data_collection");
        assert_eq!(event.detail_str("legal_basis"), Some("consent"));
        assert_eq!(event.details()["record_count"], 3);
    }

    #[test]
    fn test_security_event_carries_ip_hash() {
        let event = AuditEvent::security_event(
            "c1",
            "anonymous",
            SecurityEventKind::FailedAuth,
            SecuritySeverity::Medium,
            Some("ab12"),
        );
        assert_eq!(event.action(), "failed_auth");
        assert_eq!(event.ip_hash(), Some("ab12"));
    }
}
