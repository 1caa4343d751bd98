//! Concrete Health Checks
//!
//! Each check implements `HealthCheck` and is registered with the
//! monitor behind a `RetryingCheck`:
//! - `DependencyCheck`: connect + trivial round trip (database, cache)
//! - `ExternalApiCheck`: minimal real HTTP call classified by status
//! - `SystemResourceCheck`: CPU/memory/disk against thresholds
//! - `CircuitBreakerCheck`: count of open breakers

pub mod circuit_breakers;
pub mod dependency;
pub mod external_api;
pub mod system_resources;

pub use circuit_breakers::CircuitBreakerCheck;
pub use dependency::{DependencyCheck, TcpProbe};
pub use external_api::{ExternalApiCheck, classify_response};
pub use system_resources::{ResourceThresholds, SysinfoSampler, SystemResourceCheck, Threshold};
