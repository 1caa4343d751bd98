//! Name-keyed metric registry.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use super::{Counter, Gauge, Histogram, Metric, Summary};
use crate::domain::clock::{Clock, SystemClock};
use crate::domain::error::MetricError;

/// Collection of metrics with duplicate-registration protection.
///
/// Constructed once at startup and shared by `Arc`; each metric keeps its
/// own lock, the registry lock only guards the name map.
pub struct MetricRegistry {
    metrics: RwLock<BTreeMap<String, Arc<dyn Metric>>>,
    clock: Arc<dyn Clock>,
}

impl MetricRegistry {
    /// Empty registry on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Empty registry whose summaries read time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            metrics: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    /// Register a metric; fails if the name is taken.
    pub fn register(&self, metric: Arc<dyn Metric>) -> Result<(), MetricError> {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        let name = metric.name().to_string();
        if metrics.contains_key(&name) {
            return Err(MetricError::Duplicate(name));
        }
        metrics.insert(name, metric);
        Ok(())
    }

    /// Create and register a counter.
    pub fn counter(
        &self,
        name: &str,
        description: &str,
        label_names: &[&str],
    ) -> Result<Arc<Counter>, MetricError> {
        let counter = Arc::new(Counter::new(name, description, label_names));
        self.register(counter.clone())?;
        Ok(counter)
    }

    /// Create and register a gauge.
    pub fn gauge(
        &self,
        name: &str,
        description: &str,
        label_names: &[&str],
    ) -> Result<Arc<Gauge>, MetricError> {
        let gauge = Arc::new(Gauge::new(name, description, label_names));
        self.register(gauge.clone())?;
        Ok(gauge)
    }

    /// Create and register a histogram.
    pub fn histogram(
        &self,
        name: &str,
        description: &str,
        label_names: &[&str],
        buckets: &[f64],
    ) -> Result<Arc<Histogram>, MetricError> {
        let histogram = Arc::new(Histogram::new(name, description, label_names, buckets)?);
        self.register(histogram.clone())?;
        Ok(histogram)
    }

    /// Create and register a summary on the registry clock.
    pub fn summary(
        &self,
        name: &str,
        description: &str,
        label_names: &[&str],
        max_age: Duration,
    ) -> Result<Arc<Summary>, MetricError> {
        let summary = Arc::new(
            Summary::new(name, description, label_names, max_age)?.with_clock(Arc::clone(&self.clock)),
        );
        self.register(summary.clone())?;
        Ok(summary)
    }

    /// Remove a metric; returns whether it existed.
    pub fn unregister(&self, name: &str) -> bool {
        self.metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// Remove every metric.
    pub fn clear(&self) {
        self.metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Look up a metric by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Metric>> {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Stable, name-ordered snapshot of every registered metric.
    pub fn get_all(&self) -> Vec<Arc<dyn Metric>> {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Number of registered metrics.
    pub fn len(&self) -> usize {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::MetricKind;

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = MetricRegistry::new();
        registry.counter("requests_total", "Requests", &[]).unwrap();
        let err = registry.gauge("requests_total", "Again", &[]).unwrap_err();
        assert_eq!(err, MetricError::Duplicate("requests_total".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_all_is_name_ordered() {
        let registry = MetricRegistry::new();
        registry.gauge("zeta", "z", &[]).unwrap();
        registry.counter("alpha", "a", &[]).unwrap();
        let names: Vec<String> = registry.get_all().iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_unregister_and_clear() {
        let registry = MetricRegistry::new();
        registry.counter("a", "a", &[]).unwrap();
        registry.counter("b", "b", &[]).unwrap();
        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert_eq!(registry.get("b").map(|m| m.kind()), Some(MetricKind::Counter));
        registry.clear();
        assert!(registry.is_empty());
    }
}
