use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::tree::DecisionTree;
use super::ModelError;
use crate::scoring::features::FeatureSchema;

/// Artifact format revision this build understands. The serialization format
/// is owned by the offline training pipeline and treated as append-only; a
/// reader must refuse anything it was not built for rather than silently
/// misinterpret features.
pub const MODEL_FORMAT_VERSION: u32 = 1;

pub const GRADIENT_BOOSTED_TREES: &str = "gradient_boosted_trees";

/// Serialized classifier as produced by the offline training run: the tree
/// ensemble, the feature schema it was fitted against, and the threshold
/// selected on the validation fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub model_kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<NaiveDate>,
    /// Margin added before any tree contributes.
    pub base_margin: f64,
    /// Decision threshold selected offline (cost-optimal operating point).
    pub trained_threshold: f64,
    pub schema: FeatureSchema,
    pub trees: Vec<DecisionTree>,
}

impl ModelArtifact {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ModelError::Unavailable {
            path: path.display().to_string(),
            source,
        })?;
        let artifact: Self =
            serde_json::from_str(&raw).map_err(|source| ModelError::Corrupt {
                path: path.display().to_string(),
                source,
            })?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn from_json(raw: &str) -> Result<Self, ModelError> {
        let artifact: Self = serde_json::from_str(raw).map_err(|source| ModelError::Corrupt {
            path: "<inline>".to_string(),
            source,
        })?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(ModelError::UnsupportedVersion {
                found: self.format_version,
                expected: MODEL_FORMAT_VERSION,
            });
        }
        if self.model_kind != GRADIENT_BOOSTED_TREES {
            return Err(ModelError::UnsupportedKind(self.model_kind.clone()));
        }
        if self.schema.is_empty() {
            return Err(ModelError::Invalid("feature schema is empty".to_string()));
        }
        if self.trees.is_empty() {
            return Err(ModelError::Invalid("ensemble has no trees".to_string()));
        }
        if !self.base_margin.is_finite() {
            return Err(ModelError::Invalid("base margin is not finite".to_string()));
        }
        if !(0.0..=1.0).contains(&self.trained_threshold) {
            return Err(ModelError::Invalid(format!(
                "trained threshold {} is not a probability",
                self.trained_threshold
            )));
        }
        for (index, tree) in self.trees.iter().enumerate() {
            tree.validate(self.schema.len())
                .map_err(|source| ModelError::InvalidTree { index, source })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::features::FeatureSpec;
    use crate::scoring::model::tree::Node;

    fn artifact() -> ModelArtifact {
        ModelArtifact {
            format_version: MODEL_FORMAT_VERSION,
            model_kind: GRADIENT_BOOSTED_TREES.to_string(),
            trained_at: NaiveDate::from_ymd_opt(2026, 3, 14),
            base_margin: -1.0,
            trained_threshold: 0.35,
            schema: FeatureSchema::new(vec![FeatureSpec::numeric("EXT_SOURCE_2", Some(0.5))]),
            trees: vec![DecisionTree::new(vec![
                Node::Split {
                    feature: 0,
                    threshold: 0.5,
                    left: 1,
                    right: 2,
                    cover: 10.0,
                },
                Node::Leaf {
                    value: 1.0,
                    cover: 4.0,
                },
                Node::Leaf {
                    value: -1.0,
                    cover: 6.0,
                },
            ])],
        }
    }

    #[test]
    fn round_trips_through_json() {
        let artifact = artifact();
        let json = serde_json::to_string(&artifact).expect("serializes");
        let restored = ModelArtifact::from_json(&json).expect("parses");
        assert_eq!(restored, artifact);
    }

    #[test]
    fn rejects_version_mismatch() {
        let mut artifact = artifact();
        artifact.format_version = 2;
        let json = serde_json::to_string(&artifact).expect("serializes");
        assert!(matches!(
            ModelArtifact::from_json(&json),
            Err(ModelError::UnsupportedVersion {
                found: 2,
                expected: MODEL_FORMAT_VERSION
            })
        ));
    }

    #[test]
    fn rejects_unknown_model_kind() {
        let mut artifact = artifact();
        artifact.model_kind = "linear_regression".to_string();
        let json = serde_json::to_string(&artifact).expect("serializes");
        assert!(matches!(
            ModelArtifact::from_json(&json),
            Err(ModelError::UnsupportedKind(_))
        ));
    }

    #[test]
    fn missing_path_is_unavailable() {
        let result = ModelArtifact::from_path("/nonexistent/model.json");
        assert!(matches!(result, Err(ModelError::Unavailable { .. })));
    }
}
