//! Gauge.

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{LabelSet, Metric, MetricDesc, MetricKind, Sample, lock};
use crate::domain::error::MetricError;

/// A value that can be set or moved in either direction.
#[derive(Debug)]
pub struct Gauge {
    desc: MetricDesc,
    series: Mutex<BTreeMap<LabelSet, f64>>,
}

impl Gauge {
    /// Create a gauge. Unlabeled gauges start with a zero series.
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

    /// Overwrite the series value.
    pub fn set(&self, value: f64, labels: &[(&str, &str)]) -> Result<(), MetricError> {
        let key = self.desc.resolve(labels)?;
        lock(&self.series).insert(key, value);
        Ok(())
    }

    /// Add `delta` (may be negative).
    pub fn add(&self, delta: f64, labels: &[(&str, &str)]) -> Result<(), MetricError> {
        let key = self.desc.resolve(labels)?;
        *lock(&self.series).entry(key).or_insert(0.0) += delta;
        Ok(())
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

impl Metric for Gauge {
    fn desc(&self) -> &MetricDesc {
        &self.desc
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Gauge
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
    fn test_gauge_set_and_add() {
        let gauge = Gauge::new("queue_depth", "Queued events", &["queue"]);
        gauge.set(10.0, &[("queue", "audit")]).unwrap();
        gauge.add(-3.0, &[("queue", "audit")]).unwrap();
        assert!((gauge.value(&[("queue", "audit")]) - 7.0).abs() < f64::EPSILON);
    }
}
