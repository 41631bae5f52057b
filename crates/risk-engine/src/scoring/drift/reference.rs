use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Reference-artifact format revision this build understands.
pub const REFERENCE_FORMAT_VERSION: u32 = 1;

/// Training-time summary of one feature's distribution: fixed histogram bin
/// edges plus the proportion of training mass per bucket. Buckets are
/// `(-inf, e0]`, `(e0, e1]`, ..., `(e_last, +inf)`, so `proportions` has one
/// more entry than `edges`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBaseline {
    pub name: String,
    pub edges: Vec<f64>,
    pub proportions: Vec<f64>,
}

impl FeatureBaseline {
    pub fn bucket_count(&self) -> usize {
        self.edges.len() + 1
    }

    /// Bucket index for a live value, using the same edges that bucketed the
    /// training data.
    pub fn bucket_index(&self, value: f64) -> usize {
        self.edges
            .iter()
            .position(|edge| value <= *edge)
            .unwrap_or(self.edges.len())
    }

    fn validate(&self) -> Result<(), String> {
        if self.edges.is_empty() {
            return Err(format!("feature '{}' has no bin edges", self.name));
        }
        if self.edges.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(format!(
                "feature '{}' has unsorted or duplicate bin edges",
                self.name
            ));
        }
        if self.edges.iter().any(|edge| !edge.is_finite()) {
            return Err(format!("feature '{}' has non-finite bin edges", self.name));
        }
        if self.proportions.len() != self.bucket_count() {
            return Err(format!(
                "feature '{}' has {} proportions for {} buckets",
                self.name,
                self.proportions.len(),
                self.bucket_count()
            ));
        }
        if self
            .proportions
            .iter()
            .any(|proportion| !proportion.is_finite() || *proportion < 0.0)
        {
            return Err(format!(
                "feature '{}' has negative or non-finite proportions",
                self.name
            ));
        }
        let total: f64 = self.proportions.iter().sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(format!(
                "feature '{}' proportions sum to {total}, expected 1",
                self.name
            ));
        }
        Ok(())
    }
}

/// Per-feature summary statistics captured at training time. Loaded once at
/// process start; read-only for the process lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDistribution {
    pub format_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<NaiveDate>,
    pub features: Vec<FeatureBaseline>,
}

impl ReferenceDistribution {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ReferenceError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ReferenceError::Unavailable {
            path: path.display().to_string(),
            source,
        })?;
        let reference: Self =
            serde_json::from_str(&raw).map_err(|source| ReferenceError::Corrupt {
                path: path.display().to_string(),
                source,
            })?;
        reference.validate()?;
        Ok(reference)
    }

    pub fn from_json(raw: &str) -> Result<Self, ReferenceError> {
        let reference: Self =
            serde_json::from_str(raw).map_err(|source| ReferenceError::Corrupt {
                path: "<inline>".to_string(),
                source,
            })?;
        reference.validate()?;
        Ok(reference)
    }

    pub fn validate(&self) -> Result<(), ReferenceError> {
        if self.format_version != REFERENCE_FORMAT_VERSION {
            return Err(ReferenceError::UnsupportedVersion {
                found: self.format_version,
                expected: REFERENCE_FORMAT_VERSION,
            });
        }
        if self.features.is_empty() {
            return Err(ReferenceError::Invalid(
                "reference distribution has no features".to_string(),
            ));
        }
        for baseline in &self.features {
            baseline.validate().map_err(ReferenceError::Invalid)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Reference-artifact loading failures. Fatal at startup, same contract as
/// the classifier artifact.
#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("reference distribution not found at {path}: {source}")]
    Unavailable {
        path: String,
        source: std::io::Error,
    },
    #[error("reference distribution at {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },
    #[error("reference format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("reference distribution is inconsistent: {0}")]
    Invalid(String),
}
