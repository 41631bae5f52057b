use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Raw applicant payload as received at the serving boundary.
///
/// Immutable once constructed; each request builds one and discards it after
/// scoring.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicantRecord {
    pub fields: BTreeMap<String, RawValue>,
}

impl ApplicantRecord {
    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.fields.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: RawValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, RawValue)>,
        K: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }
}

/// Mixed-type raw field value prior to encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Boolean(bool),
    Number(f64),
    Text(String),
    Null,
}

/// Ordered numeric features with the trained schema's fixed length and order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(pub Vec<f64>);

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// Accept/reject adjudication against the configured threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub const fn label(self) -> &'static str {
        match self {
            Decision::Accept => "accept",
            Decision::Reject => "reject",
        }
    }
}

/// Outcome of scoring a single feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Calibrated default probability in `[0, 1]`.
    pub probability: f64,
    pub decision: Decision,
    /// Threshold the decision was taken against.
    pub threshold: f64,
}
