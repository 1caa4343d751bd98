//! Monotonic counter.

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{LabelSet, Metric, MetricDesc, MetricKind, Sample, lock};
use crate::domain::error::MetricError;

/// A counter whose stored values only increase.
#[derive(Debug)]
pub struct Counter {
    desc: MetricDesc,
    series: Mutex<BTreeMap<LabelSet, f64>>,
}

impl Counter {
    /// Create a counter. Unlabeled counters start with a zero series.
    pub fn new(name: &str, description: &str, label_names: &[&str]) -> Self {
        let desc = MetricDesc::new(name, description, label_names);
        let mut series = BTreeMap::new();
        if desc.label_names().is_empty() {
            series.insert(LabelSet::empty(), 0.0);
        }
        Self {
            desc,
            series: Mutex::new(series),
        }
    }

    /// Add `delta` to the series addressed by `labels`.
    ///
    /// Negative (or NaN) deltas are rejected and leave state unchanged.
    pub fn increment(&self, delta: f64, labels: &[(&str, &str)]) -> Result<(), MetricError> {
        if delta < 0.0 || delta.is_nan() {
            return Err(MetricError::NegativeIncrement {
                name: self.desc.name().to_string(),
            });
        }
        let key = self.desc.resolve(labels)?;
        *lock(&self.series).entry(key).or_insert(0.0) += delta;
        Ok(())
    }

    /// Add one.
    pub fn inc(&self, labels: &[(&str, &str)]) -> Result<(), MetricError> {
        self.increment(1.0, labels)
    }

    /// Current value of a series (0 if never written).
    pub fn value(&self, labels: &[(&str, &str)]) -> f64 {
        self.desc
            .resolve(labels)
            .ok()
            .and_then(|key| lock(&self.series).get(&key).copied())
            .unwrap_or(0.0)
    }
}

impl Metric for Counter {
    fn desc(&self) -> &MetricDesc {
        &self.desc
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Counter
    }

    fn samples(&self) -> Vec<Sample> {
        lock(&self.series)
            .iter()
            .map(|(labels, value)| Sample::new(self.desc.name(), labels.to_pairs_with(None), *value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_accumulates_per_series() {
        let counter = Counter::new("requests_total", "Requests", &["method"]);
        counter.inc(&[("method", "GET")]).unwrap();
        counter.increment(2.5, &[("method", "GET")]).unwrap();
        counter.inc(&[("method", "POST")]).unwrap();

        assert!((counter.value(&[("method", "GET")]) - 3.5).abs() < f64::EPSILON);
        assert!((counter.value(&[("method", "POST")]) - 1.0).abs() < f64::EPSILON);
        assert_eq!(counter.samples().len(), 2);
    }

    #[test]
    fn test_negative_increment_rejected() {
        let counter = Counter::new("errors_total", "Errors", &[]);
        counter.increment(4.0, &[]).unwrap();
        let err = counter.increment(-1.0, &[]).unwrap_err();
        assert!(matches!(err, MetricError::NegativeIncrement { .. }));
        assert!((counter.value(&[]) - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unlabeled_counter_exports_zero() {
        let counter = Counter::new("jobs_total", "Jobs", &[]);
        let samples = counter.samples();
        assert_eq!(samples.len(), 1);
        assert!(samples[0].labels.is_empty());
        assert!(samples[0].value.abs() < f64::EPSILON);
    }
}
