//! Label sets identifying one series of a metric.

use std::fmt;

use crate::domain::error::MetricError;

/// Sorted `(name, value)` pairs identifying a series.
///
/// Two label sets compare equal regardless of the order the caller
/// supplied the pairs in, so `{a="1",b="2"}` and `{b="2",a="1"}` address
/// the same series.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelSet(Vec<(String, String)>);

impl LabelSet {
    /// The unlabeled series.
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Build a label set from caller-supplied pairs.
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        let mut pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        pairs.sort();
        Self(pairs)
    }

    /// Whether this is the unlabeled series.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Label names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Look up a label value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy out the pairs, optionally followed by one extra label.
    ///
    /// The extra label (`le` or `quantile`) goes last, matching the
    /// exposition convention.
    pub fn to_pairs_with(&self, extra: Option<(&str, String)>) -> Vec<(String, String)> {
        let mut pairs = self.0.clone();
        if let Some((name, value)) = extra {
            pairs.push((name.to_string(), value));
        }
        pairs
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{k}=\"{v}\"")?;
        }
        write!(f, "}}")
    }
}

/// Name, help text and declared label names of a metric.
#[derive(Debug, Clone)]
pub struct MetricDesc {
    name: String,
    description: String,
    label_names: Vec<String>,
}

impl MetricDesc {
    /// Describe a metric. Label names are stored sorted.
    pub fn new(name: &str, description: &str, label_names: &[&str]) -> Self {
        let mut label_names: Vec<String> =
            label_names.iter().map(|n| (*n).to_string()).collect();
        label_names.sort();
        label_names.dedup();
        Self {
            name: name.to_string(),
            description: description.to_string(),
            label_names,
        }
    }

    /// Metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Help text.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Declared label names, sorted.
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Resolve caller labels into a series key.
    ///
    /// An empty slice always addresses the unlabeled series. Otherwise the
    /// supplied names must match the declared set exactly.
    pub fn resolve(&self, labels: &[(&str, &str)]) -> Result<LabelSet, MetricError> {
        if labels.is_empty() {
            return Ok(LabelSet::empty());
        }
        let set = LabelSet::new(labels);
        let matches = set.0.len() == self.label_names.len()
            && set
                .0
                .iter()
                .zip(&self.label_names)
                .all(|((k, _), declared)| k == declared);
        if matches {
            Ok(set)
        } else {
            Err(MetricError::LabelMismatch {
                name: self.name.clone(),
                expected: self.label_names.clone(),
                actual: set.names().into_iter().map(String::from).collect(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_order_is_irrelevant() {
        let a = LabelSet::new(&[("method", "GET"), ("status", "200")]);
        let b = LabelSet::new(&[("status", "200"), ("method", "GET")]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), r#"{method="GET",status="200"}"#);
    }

    #[test]
    fn test_resolve_rejects_undeclared_label() {
        let desc = MetricDesc::new("requests_total", "Requests", &["method"]);
        assert!(desc.resolve(&[("method", "GET")]).is_ok());
        assert!(desc.resolve(&[]).unwrap().is_empty());
        let err = desc.resolve(&[("path", "/")]).unwrap_err();
        assert!(matches!(err, MetricError::LabelMismatch { .. }));
    }

    #[test]
    fn test_resolve_rejects_partial_labels() {
        let desc = MetricDesc::new("requests_total", "Requests", &["method", "status"]);
        assert!(desc.resolve(&[("method", "GET")]).is_err());
    }
}
