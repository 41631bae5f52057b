//! Trained classifier consumption: artifact deserialization and ensemble
//! inference. Training itself happens offline; this module only loads and
//! evaluates what that process produced.

pub mod artifact;
pub mod tree;

pub use artifact::{ModelArtifact, GRADIENT_BOOSTED_TREES, MODEL_FORMAT_VERSION};
pub use tree::{DecisionTree, Node, TreeStructureError};

use super::domain::FeatureVector;
use super::features::SchemaError;

/// Additive tree ensemble producing a calibrated default probability.
///
/// Pure function of the feature vector and the fixed trained parameters.
/// Loaded once at startup and shared read-only across requests.
#[derive(Debug, Clone)]
pub struct GradientBoostedModel {
    base_margin: f64,
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl GradientBoostedModel {
    pub fn from_artifact(artifact: &ModelArtifact) -> Self {
        Self {
            base_margin: artifact.base_margin,
            trees: artifact.trees.clone(),
            n_features: artifact.schema.len(),
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn base_margin(&self) -> f64 {
        self.base_margin
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Raw additive margin before the logistic link.
    pub fn predict_margin(&self, features: &FeatureVector) -> Result<f64, SchemaError> {
        self.check_length(features)?;
        let values = features.values();
        let margin = self
            .trees
            .iter()
            .fold(self.base_margin, |acc, tree| acc + tree.predict(values));
        Ok(margin)
    }

    /// Calibrated default probability in `[0, 1]`.
    pub fn predict_probability(&self, features: &FeatureVector) -> Result<f64, SchemaError> {
        Ok(sigmoid(self.predict_margin(features)?))
    }

    fn check_length(&self, features: &FeatureVector) -> Result<(), SchemaError> {
        if features.len() != self.n_features {
            return Err(SchemaError::LengthMismatch {
                expected: self.n_features,
                actual: features.len(),
            });
        }
        Ok(())
    }
}

pub(crate) fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

/// Artifact loading failures. Fatal at startup: the process must not reach
/// the ready state without a usable classifier.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model artifact not found at {path}: {source}")]
    Unavailable {
        path: String,
        source: std::io::Error,
    },
    #[error("model artifact at {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },
    #[error("model artifact format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("unsupported model kind '{0}'")]
    UnsupportedKind(String),
    #[error("tree {index} is structurally invalid: {source}")]
    InvalidTree {
        index: usize,
        source: TreeStructureError,
    },
    #[error("model artifact is inconsistent: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::features::FeatureSpec;

    fn model() -> GradientBoostedModel {
        GradientBoostedModel {
            base_margin: 0.0,
            trees: vec![DecisionTree::new(vec![
                Node::Split {
                    feature: 0,
                    threshold: 0.5,
                    left: 1,
                    right: 2,
                    cover: 100.0,
                },
                Node::Leaf {
                    value: 2.0,
                    cover: 40.0,
                },
                Node::Leaf {
                    value: -2.0,
                    cover: 60.0,
                },
            ])],
            n_features: 1,
        }
    }

    #[test]
    fn probability_stays_in_unit_interval() {
        let model = model();
        let high = model
            .predict_probability(&FeatureVector(vec![0.2]))
            .expect("scores");
        let low = model
            .predict_probability(&FeatureVector(vec![0.9]))
            .expect("scores");
        assert!((0.0..=1.0).contains(&high));
        assert!((0.0..=1.0).contains(&low));
        assert!(high > low);
        assert!((high - sigmoid(2.0)).abs() < 1e-12);
        assert!((low - sigmoid(-2.0)).abs() < 1e-12);
    }

    #[test]
    fn length_mismatch_is_a_schema_error() {
        let model = model();
        let result = model.predict_probability(&FeatureVector(vec![0.2, 1.0]));
        assert!(matches!(
            result,
            Err(SchemaError::LengthMismatch {
                expected: 1,
                actual: 2
            })
        ));
    }

    #[test]
    fn from_artifact_preserves_schema_width() {
        let artifact = ModelArtifact {
            format_version: MODEL_FORMAT_VERSION,
            model_kind: GRADIENT_BOOSTED_TREES.to_string(),
            trained_at: None,
            base_margin: -1.2,
            trained_threshold: 0.35,
            schema: crate::scoring::features::FeatureSchema::new(vec![
                FeatureSpec::numeric("a", None),
                FeatureSpec::numeric("b", None),
            ]),
            trees: model().trees,
        };
        let model = GradientBoostedModel::from_artifact(&artifact);
        assert_eq!(model.n_features(), 2);
        assert_eq!(model.n_trees(), 1);
        assert_eq!(model.base_margin(), -1.2);
    }
}
