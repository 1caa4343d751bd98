//! Audit domain: event records, typed constructors and PDPA validation.

pub mod compliance;
pub mod event;
pub mod records;

pub use compliance::{BANNED_DETAIL_KEYS, ComplianceViolation, Finding, PdpaValidator, PiiPattern};
pub use event::{ANONYMOUS_ACTOR, AuditEvent, AuditEventType, SYSTEM_ACTOR, hash_identifier};
pub use records::{
    AccessOutcome, ConsultationRecord, DataOperation, LegalBasis, ProcessingPurpose,
    SecurityEventKind, SecuritySeverity, UrgencyLevel,
};
