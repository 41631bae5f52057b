//! Applicant scoring core: feature encoding, classifier inference,
//! per-prediction attribution, and batch drift monitoring, plus the HTTP
//! router that exposes them.

pub mod domain;
pub mod drift;
pub mod engine;
pub mod explain;
pub mod features;
pub mod model;
pub mod router;
pub mod service;

pub use domain::{ApplicantRecord, Decision, FeatureVector, RawValue, ScoreResult};
pub use drift::{
    DriftConfig, DriftMonitor, DriftReport, DriftVerdict, FeatureBaseline, FeatureDrift,
    ReferenceDistribution, ReferenceError, REFERENCE_FORMAT_VERSION,
};
pub use engine::{DecisionPolicy, ScoringEngine};
pub use explain::{
    AttributionError, ContributionDirection, ExplainError, Explanation, FeatureContribution,
    FeatureImportance, TreeExplainer,
};
pub use features::{FeatureEncoding, FeatureSchema, FeatureSpec, SchemaError};
pub use model::{
    DecisionTree, GradientBoostedModel, ModelArtifact, ModelError, Node,
    GRADIENT_BOOSTED_TREES, MODEL_FORMAT_VERSION,
};
pub use router::{parse_record_csv, scoring_router};
pub use service::{
    ContextError, DriftCheckOutcome, ModelMetadata, ScoredApplicant, ScoringContext,
};
