use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use risk_engine::config::ScoringSettings;
use risk_engine::scoring::{
    DecisionTree, FeatureBaseline, FeatureSchema, FeatureSpec, ModelArtifact, Node,
    ReferenceDistribution, GRADIENT_BOOSTED_TREES, MODEL_FORMAT_VERSION,
    REFERENCE_FORMAT_VERSION,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Small but realistic classifier used by the `demo` subcommand and route
/// tests: six application features, four trees, threshold from a trained
/// operating point.
pub(crate) fn demo_model_artifact() -> ModelArtifact {
    let mut education_levels = BTreeMap::new();
    education_levels.insert("Secondary".to_string(), 0.0);
    education_levels.insert("Incomplete higher".to_string(), 1.0);
    education_levels.insert("Higher education".to_string(), 2.0);

    let schema = FeatureSchema::new(vec![
        FeatureSpec::numeric("EXT_SOURCE_2", Some(0.5)),
        FeatureSpec::numeric("EXT_SOURCE_3", Some(0.5)),
        FeatureSpec::numeric("PAYMENT_RATE", Some(0.05)),
        FeatureSpec::numeric("AMT_ANNUITY", None),
        FeatureSpec::numeric("DAYS_EMPLOYED", Some(0.0)),
        FeatureSpec::categorical("NAME_EDUCATION_TYPE", education_levels, Some(0.0)),
    ]);

    ModelArtifact {
        format_version: MODEL_FORMAT_VERSION,
        model_kind: GRADIENT_BOOSTED_TREES.to_string(),
        trained_at: None,
        base_margin: -1.1,
        trained_threshold: 0.35,
        schema,
        trees: vec![
            DecisionTree::new(vec![
                Node::Split {
                    feature: 0,
                    threshold: 0.55,
                    left: 1,
                    right: 4,
                    cover: 1000.0,
                },
                Node::Split {
                    feature: 2,
                    threshold: 0.08,
                    left: 2,
                    right: 3,
                    cover: 430.0,
                },
                Node::Leaf {
                    value: 0.45,
                    cover: 260.0,
                },
                Node::Leaf {
                    value: 1.05,
                    cover: 170.0,
                },
                Node::Leaf {
                    value: -0.75,
                    cover: 570.0,
                },
            ]),
            DecisionTree::new(vec![
                Node::Split {
                    feature: 1,
                    threshold: 0.5,
                    left: 1,
                    right: 2,
                    cover: 1000.0,
                },
                Node::Leaf {
                    value: 0.6,
                    cover: 480.0,
                },
                Node::Leaf {
                    value: -0.55,
                    cover: 520.0,
                },
            ]),
            DecisionTree::new(vec![
                Node::Split {
                    feature: 4,
                    threshold: -900.0,
                    left: 1,
                    right: 2,
                    cover: 1000.0,
                },
                Node::Leaf {
                    value: -0.3,
                    cover: 640.0,
                },
                Node::Leaf {
                    value: 0.35,
                    cover: 360.0,
                },
            ]),
            DecisionTree::new(vec![
                Node::Split {
                    feature: 3,
                    threshold: 32000.0,
                    left: 1,
                    right: 2,
                    cover: 1000.0,
                },
                Node::Leaf {
                    value: -0.15,
                    cover: 690.0,
                },
                Node::Split {
                    feature: 5,
                    threshold: 1.0,
                    left: 3,
                    right: 4,
                    cover: 310.0,
                },
                Node::Leaf {
                    value: 0.5,
                    cover: 200.0,
                },
                Node::Leaf {
                    value: 0.1,
                    cover: 110.0,
                },
            ]),
        ],
    }
}

pub(crate) fn demo_reference_distribution() -> ReferenceDistribution {
    ReferenceDistribution {
        format_version: REFERENCE_FORMAT_VERSION,
        captured_at: None,
        features: vec![
            FeatureBaseline {
                name: "EXT_SOURCE_2".to_string(),
                edges: vec![0.3, 0.5, 0.7],
                proportions: vec![0.2, 0.3, 0.3, 0.2],
            },
            FeatureBaseline {
                name: "EXT_SOURCE_3".to_string(),
                edges: vec![0.3, 0.5, 0.7],
                proportions: vec![0.25, 0.3, 0.25, 0.2],
            },
            FeatureBaseline {
                name: "PAYMENT_RATE".to_string(),
                edges: vec![0.03, 0.06, 0.1],
                proportions: vec![0.3, 0.35, 0.25, 0.1],
            },
            FeatureBaseline {
                name: "AMT_ANNUITY".to_string(),
                edges: vec![15000.0, 30000.0, 45000.0],
                proportions: vec![0.3, 0.4, 0.2, 0.1],
            },
            FeatureBaseline {
                name: "DAYS_EMPLOYED".to_string(),
                edges: vec![-3000.0, -1000.0, 0.0],
                proportions: vec![0.35, 0.35, 0.25, 0.05],
            },
            FeatureBaseline {
                name: "NAME_EDUCATION_TYPE".to_string(),
                edges: vec![0.5, 1.5],
                proportions: vec![0.6, 0.15, 0.25],
            },
        ],
    }
}

pub(crate) fn demo_settings() -> ScoringSettings {
    ScoringSettings {
        model_path: "<built-in>".into(),
        reference_path: "<built-in>".into(),
        threshold_override: None,
        drift_psi_threshold: 0.2,
        drift_feature_thresholds: BTreeMap::new(),
        drift_min_samples: 20,
        drift_min_flagged: 1,
        explain_top_features: 5,
    }
}
