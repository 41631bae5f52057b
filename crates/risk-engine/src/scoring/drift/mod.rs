//! Batch drift detection against the training-time reference distribution.
//!
//! Batch-local by design: every `check_drift` call compares one batch
//! against the stored reference with no state carried between batches.

mod psi;
pub mod reference;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::domain::FeatureVector;
pub use reference::{
    FeatureBaseline, ReferenceDistribution, ReferenceError, REFERENCE_FORMAT_VERSION,
};

/// Drift detection tuning, externally supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftConfig {
    /// PSI above this flags a feature unless overridden per feature.
    pub psi_threshold: f64,
    /// Per-feature overrides of `psi_threshold`.
    #[serde(default)]
    pub feature_thresholds: BTreeMap<String, f64>,
    /// Batches smaller than this yield an insufficient-data verdict instead
    /// of a drift verdict.
    pub min_samples: usize,
    /// How many features must be flagged before the overall verdict flips.
    pub min_flagged_features: usize,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            psi_threshold: 0.2,
            feature_thresholds: BTreeMap::new(),
            min_samples: 30,
            min_flagged_features: 1,
        }
    }
}

impl DriftConfig {
    fn threshold_for(&self, feature: &str) -> f64 {
        self.feature_thresholds
            .get(feature)
            .copied()
            .unwrap_or(self.psi_threshold)
    }
}

/// Overall outcome of one drift check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftVerdict {
    NoDrift,
    DriftDetected,
    InsufficientData,
}

impl DriftVerdict {
    pub const fn label(self) -> &'static str {
        match self {
            DriftVerdict::NoDrift => "no_drift",
            DriftVerdict::DriftDetected => "drift_detected",
            DriftVerdict::InsufficientData => "insufficient_data",
        }
    }
}

/// Divergence of one live feature against its baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDrift {
    pub feature: String,
    pub psi: f64,
    pub threshold: f64,
    pub drifted: bool,
}

/// Result of comparing one batch against the reference distribution.
/// Deterministic for a given batch, so identical batches produce identical
/// reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub verdict: DriftVerdict,
    pub sample_count: usize,
    pub min_samples: usize,
    pub flagged: usize,
    pub features: Vec<FeatureDrift>,
}

/// Stateless drift monitor over the process-wide reference distribution.
#[derive(Debug)]
pub struct DriftMonitor {
    reference: Arc<ReferenceDistribution>,
    config: DriftConfig,
}

impl DriftMonitor {
    pub fn new(reference: Arc<ReferenceDistribution>, config: DriftConfig) -> Self {
        Self { reference, config }
    }

    pub fn reference(&self) -> &ReferenceDistribution {
        &self.reference
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Compares one batch of encoded feature vectors against the reference.
    ///
    /// Vectors whose length disagrees with the reference are ignored; the
    /// remaining sample count decides the insufficient-data guard.
    pub fn check_drift(&self, batch: &[FeatureVector]) -> DriftReport {
        let width = self.reference.len();
        let usable: Vec<&FeatureVector> = batch
            .iter()
            .filter(|vector| vector.len() == width)
            .collect();
        let sample_count = usable.len();

        if sample_count < self.config.min_samples {
            return DriftReport {
                verdict: DriftVerdict::InsufficientData,
                sample_count,
                min_samples: self.config.min_samples,
                flagged: 0,
                features: Vec::new(),
            };
        }

        let mut features = Vec::with_capacity(width);
        let mut flagged = 0;
        for (index, baseline) in self.reference.features.iter().enumerate() {
            let observed = psi::bucket_proportions(
                baseline,
                usable.iter().map(|vector| vector.values()[index]),
                sample_count,
            );
            let psi = psi::population_stability_index(&baseline.proportions, &observed);
            let threshold = self.config.threshold_for(&baseline.name);
            let drifted = psi > threshold;
            if drifted {
                flagged += 1;
            }
            features.push(FeatureDrift {
                feature: baseline.name.clone(),
                psi,
                threshold,
                drifted,
            });
        }

        let verdict = if flagged >= self.config.min_flagged_features.max(1) {
            DriftVerdict::DriftDetected
        } else {
            DriftVerdict::NoDrift
        };

        DriftReport {
            verdict,
            sample_count,
            min_samples: self.config.min_samples,
            flagged,
            features,
        }
    }
}
