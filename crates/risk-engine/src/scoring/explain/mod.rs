//! Per-applicant attribution and population-level importances for the tree
//! ensemble. Local attribution is a pure recursive function over the fixed
//! ensemble structure, so explanations stay consistent with the scores they
//! accompany.

mod attribution;
mod importance;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::domain::FeatureVector;
use super::features::{FeatureSchema, SchemaError};
use super::model::GradientBoostedModel;
use attribution::{attribute_margin, rescale_to_probability};

/// Direction a feature pushed this applicant's default probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionDirection {
    IncreasesRisk,
    DecreasesRisk,
}

impl ContributionDirection {
    fn from_contribution(contribution: f64) -> Self {
        if contribution > 0.0 {
            Self::IncreasesRisk
        } else {
            Self::DecreasesRisk
        }
    }
}

/// One feature's share of a single prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: String,
    /// Encoded value the model actually saw.
    pub value: f64,
    pub contribution: f64,
    pub direction: ContributionDirection,
}

/// Local attribution for one scored applicant. Satisfies
/// `base_value + sum(contributions) == probability` within numerical
/// tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// Probability the model assigns to the average training applicant.
    pub base_value: f64,
    pub probability: f64,
    /// Full per-feature contributions in schema order.
    pub contributions: Vec<FeatureContribution>,
}

impl Explanation {
    /// Residual of the additivity identity; near zero for a healthy
    /// explanation.
    pub fn additivity_gap(&self) -> f64 {
        let total: f64 = self
            .contributions
            .iter()
            .map(|contribution| contribution.contribution)
            .sum();
        (self.base_value + total - self.probability).abs()
    }

    /// Contributions ranked by absolute impact, strongest first, truncated
    /// to `limit`.
    pub fn ranked(&self, limit: usize) -> Vec<FeatureContribution> {
        let mut ranked = self.contributions.clone();
        ranked.sort_by(|a, b| {
            b.contribution
                .abs()
                .partial_cmp(&a.contribution.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(limit);
        ranked
    }
}

/// Average contribution of a feature across the training population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Explainability failure on a single request. Recoverable: the caller gets
/// the score without an explanation rather than an error response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttributionError {
    #[error("attribution for feature '{feature}' is not finite")]
    NonFinite { feature: String },
    #[error("explanation is not additive: gap {gap}")]
    NotAdditive { gap: f64 },
}

const ADDITIVITY_TOLERANCE: f64 = 1e-6;

/// Path-attribution explainer over the loaded ensemble.
///
/// Per-node expectations are computed once at construction; explaining a
/// vector afterwards touches only the nodes on its decision paths.
#[derive(Debug)]
pub struct TreeExplainer {
    model: Arc<GradientBoostedModel>,
    expectations: Vec<Vec<f64>>,
}

impl TreeExplainer {
    pub fn new(model: Arc<GradientBoostedModel>) -> Self {
        let expectations = model
            .trees()
            .iter()
            .map(|tree| tree.expectations())
            .collect();
        Self {
            model,
            expectations,
        }
    }

    /// Expected probability for the training population, before any feature
    /// is observed.
    pub fn base_value(&self) -> f64 {
        let base_margin = self
            .expectations
            .iter()
            .fold(self.model.base_margin(), |acc, tree| acc + tree[0]);
        super::model::sigmoid(base_margin)
    }

    /// Local attribution for one encoded feature vector.
    pub fn explain(
        &self,
        schema: &FeatureSchema,
        features: &FeatureVector,
    ) -> Result<Explanation, ExplainError> {
        if features.len() != self.model.n_features() {
            return Err(ExplainError::Schema(SchemaError::LengthMismatch {
                expected: self.model.n_features(),
                actual: features.len(),
            }));
        }

        let margin_attribution =
            attribute_margin(&self.model, &self.expectations, features.values());
        let (base_value, contributions, probability) =
            rescale_to_probability(&margin_attribution);

        let mut views = Vec::with_capacity(contributions.len());
        for (index, contribution) in contributions.into_iter().enumerate() {
            if !contribution.is_finite() {
                let feature = schema
                    .name_at(index)
                    .unwrap_or("<unknown>")
                    .to_string();
                return Err(ExplainError::Attribution(AttributionError::NonFinite {
                    feature,
                }));
            }
            views.push(FeatureContribution {
                feature: schema
                    .name_at(index)
                    .unwrap_or("<unknown>")
                    .to_string(),
                value: features.values()[index],
                contribution,
                direction: ContributionDirection::from_contribution(contribution),
            });
        }

        let explanation = Explanation {
            base_value,
            probability,
            contributions: views,
        };

        let gap = explanation.additivity_gap();
        if gap > ADDITIVITY_TOLERANCE {
            return Err(ExplainError::Attribution(AttributionError::NotAdditive {
                gap,
            }));
        }

        Ok(explanation)
    }

    /// Global importances for the loaded ensemble, strongest first.
    /// Computed from the fixed structure, so one pass at startup is enough.
    pub fn global_importance(&self, schema: &FeatureSchema) -> Vec<FeatureImportance> {
        let gains = importance::aggregate_gain(
            self.model.trees(),
            &self.expectations,
            self.model.n_features(),
        );
        let mut importances: Vec<FeatureImportance> = gains
            .into_iter()
            .enumerate()
            .map(|(index, importance)| FeatureImportance {
                feature: schema.name_at(index).unwrap_or("<unknown>").to_string(),
                importance,
            })
            .collect();
        importances.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        importances
    }
}

/// Explanation failure modes: bad input vs. attribution breakdown.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExplainError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Attribution(#[from] AttributionError),
}
