use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::domain::{Decision, FeatureVector, ScoreResult};
use super::features::SchemaError;
use super::model::GradientBoostedModel;

/// Converts a calibrated probability into an accept/reject decision.
///
/// The threshold is fixed at startup (trained operating point or deployment
/// override), never re-derived per request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionPolicy {
    pub threshold: f64,
}

impl DecisionPolicy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn decide(&self, probability: f64) -> Decision {
        if probability >= self.threshold {
            Decision::Reject
        } else {
            Decision::Accept
        }
    }
}

/// Scoring engine: classifier plus decision policy. Shares the process-wide
/// model rather than owning a copy.
#[derive(Debug)]
pub struct ScoringEngine {
    model: Arc<GradientBoostedModel>,
    policy: DecisionPolicy,
}

impl ScoringEngine {
    pub fn new(model: Arc<GradientBoostedModel>, policy: DecisionPolicy) -> Self {
        Self { model, policy }
    }

    /// Scores one encoded feature vector. The only per-request failure mode
    /// is a vector whose length disagrees with the trained schema.
    pub fn score(&self, features: &FeatureVector) -> Result<ScoreResult, SchemaError> {
        let probability = self.model.predict_probability(features)?;
        Ok(ScoreResult {
            probability,
            decision: self.policy.decide(probability),
            threshold: self.policy.threshold,
        })
    }

    pub fn model(&self) -> &GradientBoostedModel {
        &self.model
    }

    pub fn policy(&self) -> DecisionPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_is_a_pure_function_of_probability_and_threshold() {
        let policy = DecisionPolicy::new(0.35);
        assert_eq!(policy.decide(0.41), Decision::Reject);
        assert_eq!(policy.decide(0.10), Decision::Accept);
    }

    #[test]
    fn boundary_probability_rejects() {
        let policy = DecisionPolicy::new(0.35);
        assert_eq!(policy.decide(0.35), Decision::Reject);
        assert_eq!(policy.decide(0.349999), Decision::Accept);
    }
}
