use std::sync::Arc;

use tracing::{info, warn};

use super::domain::{ApplicantRecord, FeatureVector, ScoreResult};
use super::drift::{DriftConfig, DriftMonitor, DriftReport, ReferenceDistribution, ReferenceError};
use super::engine::{DecisionPolicy, ScoringEngine};
use super::explain::{Explanation, FeatureImportance, TreeExplainer};
use super::features::{FeatureSchema, SchemaError};
use super::model::{GradientBoostedModel, ModelArtifact, ModelError};
use crate::config::ScoringSettings;

/// Score plus optional explanation for one applicant.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredApplicant {
    pub score: ScoreResult,
    /// Absent when attribution failed; the score itself is still valid.
    pub explanation: Option<Explanation>,
}

/// Outcome of a batch drift check at the record boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftCheckOutcome {
    pub report: DriftReport,
    /// Records dropped because they failed the feature pipeline.
    pub skipped_records: usize,
}

/// Static facts about the loaded classifier, exposed on the health surface.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ModelMetadata {
    pub model_kind: String,
    pub format_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<chrono::NaiveDate>,
    pub feature_count: usize,
    pub tree_count: usize,
    pub threshold: f64,
}

/// Process-wide, read-only scoring context.
///
/// Explicitly constructed once during startup (the `Loading` phase) and then
/// shared untouched by every request handler. Swapping a different context in
/// tests takes the place of any hidden global state.
#[derive(Debug)]
pub struct ScoringContext {
    schema: FeatureSchema,
    engine: ScoringEngine,
    explainer: TreeExplainer,
    monitor: DriftMonitor,
    importance: Vec<FeatureImportance>,
    metadata: ModelMetadata,
    explain_top: usize,
}

impl ScoringContext {
    /// Loads both artifacts from their configured paths and assembles the
    /// context. Any failure here is fatal: the caller must not start serving.
    pub fn load(settings: &ScoringSettings) -> Result<Self, ContextError> {
        info!(path = %settings.model_path.display(), "loading classifier artifact");
        let artifact = ModelArtifact::from_path(&settings.model_path)?;

        info!(path = %settings.reference_path.display(), "loading reference distribution");
        let reference = ReferenceDistribution::from_path(&settings.reference_path)?;

        Self::from_parts(artifact, reference, settings)
    }

    /// Assembles a context from already-deserialized artifacts. Used by
    /// `load` and directly by tests and demos.
    pub fn from_parts(
        artifact: ModelArtifact,
        reference: ReferenceDistribution,
        settings: &ScoringSettings,
    ) -> Result<Self, ContextError> {
        artifact.validate()?;
        reference.validate()?;
        check_reference_alignment(&artifact.schema, &reference)?;

        let threshold = settings
            .threshold_override
            .unwrap_or(artifact.trained_threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ContextError::InvalidThreshold(threshold));
        }

        let schema = artifact.schema.clone();
        let metadata = ModelMetadata {
            model_kind: artifact.model_kind.clone(),
            format_version: artifact.format_version,
            trained_at: artifact.trained_at,
            feature_count: schema.len(),
            tree_count: artifact.trees.len(),
            threshold,
        };

        let model = Arc::new(GradientBoostedModel::from_artifact(&artifact));
        let explainer = TreeExplainer::new(model.clone());
        let importance = explainer.global_importance(&schema);

        let drift_config = DriftConfig {
            psi_threshold: settings.drift_psi_threshold,
            feature_thresholds: settings.drift_feature_thresholds.clone(),
            min_samples: settings.drift_min_samples,
            min_flagged_features: settings.drift_min_flagged,
        };
        let monitor = DriftMonitor::new(Arc::new(reference), drift_config);

        let engine = ScoringEngine::new(model.clone(), DecisionPolicy::new(threshold));

        info!(
            features = metadata.feature_count,
            trees = metadata.tree_count,
            threshold = metadata.threshold,
            "scoring context ready"
        );

        Ok(Self {
            schema,
            engine,
            explainer,
            monitor,
            importance,
            metadata,
            explain_top: settings.explain_top_features,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Cached global importances, strongest first. Computed once at load.
    pub fn global_importance(&self) -> &[FeatureImportance] {
        &self.importance
    }

    pub fn explain_top(&self) -> usize {
        self.explain_top
    }

    /// Encodes and scores one raw applicant record.
    pub fn score_record(&self, record: &ApplicantRecord) -> Result<ScoreResult, SchemaError> {
        let features = self.schema.build_features(record)?;
        self.engine.score(&features)
    }

    /// Scores one record and attaches a local attribution.
    ///
    /// Attribution failures degrade to a score-only response; the request
    /// never fails because an explanation could not be produced.
    pub fn score_record_explained(
        &self,
        record: &ApplicantRecord,
    ) -> Result<ScoredApplicant, SchemaError> {
        let features = self.schema.build_features(record)?;
        let score = self.engine.score(&features)?;

        let explanation = match self.explainer.explain(&self.schema, &features) {
            Ok(explanation) => Some(explanation),
            Err(err) => {
                warn!(error = %err, "attribution failed; returning score without explanation");
                None
            }
        };

        Ok(ScoredApplicant { score, explanation })
    }

    /// Runs the feature pipeline over a batch of raw records and checks the
    /// resulting vectors for drift. Records that fail the pipeline are
    /// skipped and counted rather than failing the batch.
    pub fn drift_check(&self, records: &[ApplicantRecord]) -> DriftCheckOutcome {
        let mut vectors = Vec::with_capacity(records.len());
        let mut skipped_records = 0;
        for record in records {
            match self.schema.build_features(record) {
                Ok(vector) => vectors.push(vector),
                Err(err) => {
                    skipped_records += 1;
                    warn!(error = %err, "record dropped from drift batch");
                }
            }
        }

        DriftCheckOutcome {
            report: self.monitor.check_drift(&vectors),
            skipped_records,
        }
    }

    /// Drift check over already-encoded vectors, for callers that batch
    /// FeatureVectors directly.
    pub fn drift_check_vectors(&self, vectors: &[FeatureVector]) -> DriftReport {
        self.monitor.check_drift(vectors)
    }
}

fn check_reference_alignment(
    schema: &FeatureSchema,
    reference: &ReferenceDistribution,
) -> Result<(), ContextError> {
    if schema.len() != reference.len() {
        return Err(ContextError::ReferenceMismatch(format!(
            "schema has {} features but reference describes {}",
            schema.len(),
            reference.len()
        )));
    }
    for (spec_name, baseline) in schema.names().zip(reference.features.iter()) {
        if spec_name != baseline.name {
            return Err(ContextError::ReferenceMismatch(format!(
                "schema feature '{}' does not match reference feature '{}'",
                spec_name, baseline.name
            )));
        }
    }
    Ok(())
}

/// Startup assembly failures. Never caught: the process exits so an
/// orchestrator can redeploy with corrected artifacts or configuration.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error("reference distribution does not match the trained schema: {0}")]
    ReferenceMismatch(String),
    #[error("decision threshold {0} is not a probability")]
    InvalidThreshold(f64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::domain::RawValue;
    use crate::scoring::drift::{FeatureBaseline, REFERENCE_FORMAT_VERSION};
    use crate::scoring::features::FeatureSpec;
    use crate::scoring::model::{
        DecisionTree, Node, GRADIENT_BOOSTED_TREES, MODEL_FORMAT_VERSION,
    };

    fn artifact() -> ModelArtifact {
        ModelArtifact {
            format_version: MODEL_FORMAT_VERSION,
            model_kind: GRADIENT_BOOSTED_TREES.to_string(),
            trained_at: None,
            base_margin: 0.0,
            trained_threshold: 0.35,
            schema: FeatureSchema::new(vec![FeatureSpec::numeric("EXT_SOURCE_2", Some(0.5))]),
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
        }
    }

    fn reference() -> ReferenceDistribution {
        ReferenceDistribution {
            format_version: REFERENCE_FORMAT_VERSION,
            captured_at: None,
            features: vec![FeatureBaseline {
                name: "EXT_SOURCE_2".to_string(),
                edges: vec![0.25, 0.5, 0.75],
                proportions: vec![0.25, 0.25, 0.25, 0.25],
            }],
        }
    }

    fn settings() -> ScoringSettings {
        ScoringSettings {
            model_path: "unused".into(),
            reference_path: "unused".into(),
            threshold_override: None,
            drift_psi_threshold: 0.2,
            drift_feature_thresholds: Default::default(),
            drift_min_samples: 4,
            drift_min_flagged: 1,
            explain_top_features: 10,
        }
    }

    #[test]
    fn context_scores_and_explains() {
        let context =
            ScoringContext::from_parts(artifact(), reference(), &settings()).expect("context");
        let record =
            ApplicantRecord::from_pairs([("EXT_SOURCE_2", RawValue::Number(0.2))]);

        let scored = context.score_record_explained(&record).expect("scores");
        assert!(scored.score.probability > 0.5);
        let explanation = scored.explanation.expect("explanation present");
        assert!(explanation.additivity_gap() < 1e-9);
    }

    #[test]
    fn missing_model_path_fails_before_serving() {
        let mut settings = settings();
        settings.model_path = "/nonexistent/model.json".into();
        match ScoringContext::load(&settings) {
            Err(ContextError::Model(ModelError::Unavailable { .. })) => {}
            other => panic!("expected unavailable model, got {other:?}"),
        }
    }

    #[test]
    fn misaligned_reference_is_rejected() {
        let mut reference = reference();
        reference.features[0].name = "SOMETHING_ELSE".to_string();
        let result = ScoringContext::from_parts(artifact(), reference, &settings());
        assert!(matches!(result, Err(ContextError::ReferenceMismatch(_))));
    }

    #[test]
    fn threshold_override_wins_over_trained_threshold() {
        let mut settings = settings();
        settings.threshold_override = Some(0.9);
        let context =
            ScoringContext::from_parts(artifact(), reference(), &settings).expect("context");
        assert_eq!(context.metadata().threshold, 0.9);

        let record =
            ApplicantRecord::from_pairs([("EXT_SOURCE_2", RawValue::Number(0.2))]);
        let score = context.score_record(&record).expect("scores");
        // sigmoid(2.0) ~ 0.88 < 0.9 so the override accepts what the trained
        // threshold would have rejected.
        assert_eq!(score.decision, crate::scoring::domain::Decision::Accept);
    }

    #[test]
    fn drift_check_skips_bad_records() {
        let context =
            ScoringContext::from_parts(artifact(), reference(), &settings()).expect("context");

        let mut records = Vec::new();
        for value in [0.1, 0.3, 0.6, 0.9] {
            records.push(ApplicantRecord::from_pairs([(
                "EXT_SOURCE_2",
                RawValue::Number(value),
            )]));
        }
        records.push(ApplicantRecord::from_pairs([(
            "EXT_SOURCE_2",
            RawValue::Text("not a number".to_string()),
        )]));

        let outcome = context.drift_check(&records);
        assert_eq!(outcome.skipped_records, 1);
        assert_eq!(outcome.report.sample_count, 4);
    }
}
