//! PDPA compliance validation for audit events.
//!
//! Two independent scans run over every event before it may be stored:
//! pattern matching over every raw string in the record (emails, phone
//! numbers, government IDs) and a recursive scan of `details` keys against a
//! banned set of free-text/identity field names. Violations name the rule
//! and the location, never the matched text.

use std::fmt;

use regex::Regex;
use serde_json::Value;

use super::event::{ANONYMOUS_ACTOR, AuditEvent, SYSTEM_ACTOR};
use crate::domain::error::ObservabilityError;

/// Detail keys that may never appear in an audit record, at any depth.
pub const BANNED_DETAIL_KEYS: &[&str] = &[
    "symptoms_text",
    "raw_input",
    "free_text",
    "user_input",
    "message",
    "notes",
    "full_name",
    "email",
    "phone",
    "address",
    "national_id",
];

/// Minimum length of a hash-shaped identity field.
pub const MIN_HASH_LEN: usize = 32;

/// Personal-data pattern classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PiiPattern {
    Email,
    Phone,
    MobileNumber,
    GovernmentId,
}

impl PiiPattern {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone_number",
            Self::MobileNumber => "mobile_number",
            Self::GovernmentId => "government_id",
        }
    }
}

/// One reason an event was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// A personal-data pattern matched a field, key or detail value.
    Pattern(PiiPattern),
    /// A banned key was present; the value is the dotted path to it.
    BannedKey(String),
    /// `user_id_hash` is not a hash or a sentinel identity.
    UnhashedIdentity,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern(p) => write!(f, "pattern:{}", p.as_str()),
            Self::BannedKey(path) => write!(f, "banned_key:{path}"),
            Self::UnhashedIdentity => f.write_str("unhashed_identity:user_id_hash"),
        }
    }
}

/// Rejected audit event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceViolation {
    pub event_id: String,
    pub findings: Vec<Finding>,
}

impl fmt::Display for ComplianceViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event {} rejected:", self.event_id)?;
        for finding in &self.findings {
            write!(f, " {finding}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ComplianceViolation {}

/// Compiled PDPA rule set.
#[derive(Debug, Clone)]
pub struct PdpaValidator {
    patterns: Vec<(PiiPattern, Regex)>,
    banned_keys: Vec<String>,
}

impl PdpaValidator {
    /// Validator with the standard pattern and key sets.
    pub fn new() -> Result<Self, ObservabilityError> {
        let specs = [
            (PiiPattern::Email, r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
            (PiiPattern::Phone, r"\b\d{10}\b"),
            (PiiPattern::MobileNumber, r"\b0[689]\d[- ]\d{3}[- ]\d{4}\b"),
            (PiiPattern::GovernmentId, r"\b\d{13}\b|\b\d-\d{4}-\d{5}-\d{2}-\d\b"),
        ];
        let patterns = specs
            .into_iter()
            .map(|(kind, src)| {
                Regex::new(src)
                    .map(|re| (kind, re))
                    .map_err(|e| ObservabilityError::Configuration(format!("pdpa pattern {}: {e}", kind.as_str())))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            banned_keys: BANNED_DETAIL_KEYS.iter().map(ToString::to_string).collect(),
        })
    }

    /// Extend the banned key set (deployment-specific fields).
    #[must_use]
    pub fn with_banned_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.banned_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Accept the event or report every finding.
    pub fn validate(&self, event: &AuditEvent) -> Result<(), ComplianceViolation> {
        let mut findings = Vec::new();

        if !is_identity_shaped(event.user_id_hash()) {
            findings.push(Finding::UnhashedIdentity);
        }

        let mut texts: Vec<&str> = vec![event.correlation_id(), event.action(), event.resource()];
        texts.extend(event.error());
        let mut numbers = Vec::new();

        let mut stack: Vec<(String, &Value)> = event
            .details()
            .iter()
            .map(|(k, v)| (k.clone(), v))
            .collect();
        for (key, _) in &stack {
            if self.is_banned(key) {
                findings.push(Finding::BannedKey(key.clone()));
            }
        }
        texts.extend(event.details().keys().map(String::as_str));
        while let Some((path, value)) = stack.pop() {
            match value {
                Value::Object(map) => {
                    for (k, v) in map {
                        let child = format!("{path}.{k}");
                        if self.is_banned(k) {
                            findings.push(Finding::BannedKey(child.clone()));
                        }
                        texts.push(k);
                        stack.push((child, v));
                    }
                }
                Value::Array(items) => {
                    for (i, v) in items.iter().enumerate() {
                        stack.push((format!("{path}[{i}]"), v));
                    }
                }
                Value::String(s) => texts.push(s),
                Value::Number(n) => numbers.push(n.to_string()),
                Value::Bool(_) | Value::Null => {}
            }
        }

        // Match raw values, never serialized JSON.
        for (kind, re) in &self.patterns {
            let hit = texts
                .iter()
                .copied()
                .chain(numbers.iter().map(String::as_str))
                .any(|t| re.is_match(t));
            if hit {
                findings.push(Finding::Pattern(*kind));
            }
        }

        if findings.is_empty() {
            Ok(())
        } else {
            Err(ComplianceViolation {
                event_id: event.event_id().to_string(),
                findings,
            })
        }
    }

    fn is_banned(&self, key: &str) -> bool {
        self.banned_keys.iter().any(|b| b.eq_ignore_ascii_case(key))
    }
}

fn is_identity_shaped(value: &str) -> bool {
    value == SYSTEM_ACTOR
        || value == ANONYMOUS_ACTOR
        || (value.len() >= MIN_HASH_LEN && value.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::event::{AuditEventType, hash_identifier};
    use serde_json::json;

    fn event() -> AuditEvent {
        AuditEvent::new(
            AuditEventType::MedicalConsultation,
            "corr-1",
            hash_identifier("user-1", b"salt"),
            "symptom_assessment",
            "consultation",
        )
    }

    #[test]
    fn test_clean_event_passes() {
        let validator = PdpaValidator::new().unwrap();
        let e = event()
            .with_detail("symptom_category", "respiratory")
            .with_detail("duration_ms", 1200);
        assert!(validator.validate(&e).is_ok());
    }

    #[test]
    fn test_email_in_value_rejected_without_echoing_it() {
        let validator = PdpaValidator::new().unwrap();
        let e = event().with_detail("contact", "somchai@example.co.th");
        let err = validator.validate(&e).unwrap_err();
        assert_eq!(err.findings, vec![Finding::Pattern(PiiPattern::Email)]);
        assert!(!err.to_string().contains("somchai"));
    }

    #[test]
    fn test_phone_and_national_id_patterns() {
        let validator = PdpaValidator::new().unwrap();
        let phone = event().with_detail("x", "call 0812345678");
        assert!(
            validator
                .validate(&phone)
                .unwrap_err()
                .findings
                .contains(&Finding::Pattern(PiiPattern::Phone))
        );

        let mobile = event().with_detail("x", "081-234-5678");
        assert!(
            validator
                .validate(&mobile)
                .unwrap_err()
                .findings
                .contains(&Finding::Pattern(PiiPattern::MobileNumber))
        );

        let id = event().with_detail("x", "1-2345-67890-12-3");
        assert!(
            validator
                .validate(&id)
                .unwrap_err()
                .findings
                .contains(&Finding::Pattern(PiiPattern::GovernmentId))
        );
    }

    #[test]
    fn test_banned_keys_found_at_depth() {
        let validator = PdpaValidator::new().unwrap();
        let e = event()
            .with_detail("symptoms_text", "headache")
            .with_detail("context", json!({"inner": {"Notes": "x"}}));
        let err = validator.validate(&e).unwrap_err();
        assert!(err.findings.contains(&Finding::BannedKey("symptoms_text".into())));
        assert!(err.findings.contains(&Finding::BannedKey("context.inner.Notes".into())));
    }

    #[test]
    fn test_raw_identity_rejected() {
        let validator = PdpaValidator::new().unwrap();
        let e = AuditEvent::new(AuditEventType::UserAccess, "c", "user-42", "access", "session");
        assert_eq!(
            validator.validate(&e).unwrap_err().findings,
            vec![Finding::UnhashedIdentity]
        );
        let system = AuditEvent::new(AuditEventType::SystemAdmin, "c", SYSTEM_ACTOR, "rotate_key", "audit");
        assert!(validator.validate(&system).is_ok());
    }

    #[test]
    fn test_pii_after_control_characters_rejected() {
        let validator = PdpaValidator::new().unwrap();
        for (value, pattern) in [
            ("callback\n0812345678", PiiPattern::Phone),
            ("callback\t0812345678", PiiPattern::Phone),
            ("id\t1234567890123", PiiPattern::GovernmentId),
            ("id\r\n1234567890123", PiiPattern::GovernmentId),
        ] {
            let e = event().with_detail("x", value);
            let err = validator.validate(&e).unwrap_err();
            assert!(err.findings.contains(&Finding::Pattern(pattern)), "{value:?} passed");
        }
    }

    #[test]
    fn test_top_level_fields_and_numbers_scanned() {
        let validator = PdpaValidator::new().unwrap();
        let action = AuditEvent::new(
            AuditEventType::DataProcessing,
            "corr-1",
            hash_identifier("user-1", b"salt"),
            "lookup\n0812345678",
            "profile",
        );
        assert!(validator.validate(&action).is_err());

        let error = event().with_error("failed for a@b.co");
        assert_eq!(
            validator.validate(&error).unwrap_err().findings,
            vec![Finding::Pattern(PiiPattern::Email)]
        );

        let number = event().with_detail("ref", 1_234_567_890_123_u64);
        assert!(validator.validate(&number).is_err());
    }

    #[test]
    fn test_custom_banned_key() {
        let validator = PdpaValidator::new().unwrap().with_banned_keys(["line_id"]);
        let e = event().with_detail("line_id", "abc");
        assert!(validator.validate(&e).is_err());
    }
}
