//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Traits the use cases require from the outside world. Adapters
//! implement them; tests substitute mocks.
//!
//! Port categories:
//! - `HealthCheck`: one probe of one dependency
//! - `AuditStorage`: persistence for audit events
//! - `DependencyProbe` / `ResourceSampler` / `CircuitBreakerSource`:
//!   raw inputs for the concrete checks
//! - `Clock`: wall-clock time (defined in the domain, re-exported here)

pub mod audit_storage;
pub mod health_check;
pub mod probes;

pub use crate::domain::clock::Clock;
pub use audit_storage::{AuditQuery, AuditStorage, DEFAULT_QUERY_LIMIT};
pub use health_check::HealthCheck;
pub use probes::{BreakerState, CircuitBreakerSource, DependencyProbe, ResourceSampler, ResourceUsage};
