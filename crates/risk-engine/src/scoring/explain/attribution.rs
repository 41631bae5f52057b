use crate::scoring::model::{sigmoid, DecisionTree, GradientBoostedModel, Node};

/// Margin-space attribution for one feature vector: the ensemble margin
/// decomposed into a base expectation plus one additive term per feature.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MarginAttribution {
    pub(crate) base_margin: f64,
    pub(crate) contributions: Vec<f64>,
    pub(crate) margin: f64,
}

/// Walks every tree's decision path, crediting each split's feature with the
/// change in cover-weighted expectation between parent and chosen child. Per
/// tree the credited deltas telescope to `leaf - root_expectation`, so the
/// decomposition is additive by construction.
pub(crate) fn attribute_margin(
    model: &GradientBoostedModel,
    expectations: &[Vec<f64>],
    values: &[f64],
) -> MarginAttribution {
    let mut contributions = vec![0.0; model.n_features()];
    let mut base_margin = model.base_margin();
    let mut margin = model.base_margin();

    for (tree, tree_expectations) in model.trees().iter().zip(expectations) {
        base_margin += tree_expectations[0];
        margin += walk_tree(tree, tree_expectations, values, &mut contributions);
    }

    MarginAttribution {
        base_margin,
        contributions,
        margin,
    }
}

fn walk_tree(
    tree: &DecisionTree,
    expectations: &[f64],
    values: &[f64],
    contributions: &mut [f64],
) -> f64 {
    let mut index = 0;
    let mut current = expectations[0];
    loop {
        match &tree.nodes[index] {
            Node::Leaf { value, .. } => return *value,
            Node::Split {
                feature,
                threshold,
                left,
                right,
                ..
            } => {
                let next = if values[*feature] <= *threshold {
                    *left
                } else {
                    *right
                };
                contributions[*feature] += expectations[next] - current;
                current = expectations[next];
                index = next;
            }
        }
    }
}

/// Maps a margin-space attribution into probability space with a linear
/// rescale, preserving exact additivity:
/// `base_value + sum(contributions) == probability`.
pub(crate) fn rescale_to_probability(attribution: &MarginAttribution) -> (f64, Vec<f64>, f64) {
    let probability = sigmoid(attribution.margin);
    let base_value = sigmoid(attribution.base_margin);
    let margin_delta = attribution.margin - attribution.base_margin;

    if margin_delta.abs() < f64::EPSILON {
        return (
            base_value,
            vec![0.0; attribution.contributions.len()],
            base_value,
        );
    }

    let scale = (probability - base_value) / margin_delta;
    let contributions = attribution
        .contributions
        .iter()
        .map(|contribution| contribution * scale)
        .collect();

    (base_value, contributions, probability)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::domain::FeatureVector;
    use crate::scoring::features::{FeatureSchema, FeatureSpec};
    use crate::scoring::model::{
        ModelArtifact, GRADIENT_BOOSTED_TREES, MODEL_FORMAT_VERSION,
    };

    fn two_tree_model() -> GradientBoostedModel {
        let artifact = ModelArtifact {
            format_version: MODEL_FORMAT_VERSION,
            model_kind: GRADIENT_BOOSTED_TREES.to_string(),
            trained_at: None,
            base_margin: -0.5,
            trained_threshold: 0.35,
            schema: FeatureSchema::new(vec![
                FeatureSpec::numeric("a", None),
                FeatureSpec::numeric("b", None),
            ]),
            trees: vec![
                DecisionTree::new(vec![
                    Node::Split {
                        feature: 0,
                        threshold: 0.5,
                        left: 1,
                        right: 2,
                        cover: 100.0,
                    },
                    Node::Leaf {
                        value: 1.2,
                        cover: 30.0,
                    },
                    Node::Split {
                        feature: 1,
                        threshold: 10.0,
                        left: 3,
                        right: 4,
                        cover: 70.0,
                    },
                    Node::Leaf {
                        value: -0.4,
                        cover: 50.0,
                    },
                    Node::Leaf {
                        value: 0.8,
                        cover: 20.0,
                    },
                ]),
                DecisionTree::new(vec![
                    Node::Split {
                        feature: 1,
                        threshold: 5.0,
                        left: 1,
                        right: 2,
                        cover: 100.0,
                    },
                    Node::Leaf {
                        value: -0.3,
                        cover: 45.0,
                    },
                    Node::Leaf {
                        value: 0.6,
                        cover: 55.0,
                    },
                ]),
            ],
        };
        GradientBoostedModel::from_artifact(&artifact)
    }

    #[test]
    fn margin_attribution_telescopes_to_the_prediction() {
        let model = two_tree_model();
        let expectations: Vec<Vec<f64>> =
            model.trees().iter().map(|tree| tree.expectations()).collect();
        let vector = FeatureVector(vec![0.8, 12.0]);

        let attribution = attribute_margin(&model, &expectations, vector.values());
        let margin = model.predict_margin(&vector).expect("margin");

        assert!((attribution.margin - margin).abs() < 1e-12);
        let reconstructed: f64 =
            attribution.base_margin + attribution.contributions.iter().sum::<f64>();
        assert!((reconstructed - margin).abs() < 1e-9);
    }

    #[test]
    fn probability_rescale_preserves_additivity() {
        let model = two_tree_model();
        let expectations: Vec<Vec<f64>> =
            model.trees().iter().map(|tree| tree.expectations()).collect();
        let vector = FeatureVector(vec![0.1, 3.0]);

        let attribution = attribute_margin(&model, &expectations, vector.values());
        let (base_value, contributions, probability) = rescale_to_probability(&attribution);

        let gap = (base_value + contributions.iter().sum::<f64>() - probability).abs();
        assert!(gap < 1e-9, "additivity gap {gap} too large");
        assert!((0.0..=1.0).contains(&probability));
    }

    #[test]
    fn features_absent_from_every_split_contribute_nothing() {
        let artifact = ModelArtifact {
            format_version: MODEL_FORMAT_VERSION,
            model_kind: GRADIENT_BOOSTED_TREES.to_string(),
            trained_at: None,
            base_margin: 0.0,
            trained_threshold: 0.35,
            schema: FeatureSchema::new(vec![
                FeatureSpec::numeric("a", None),
                FeatureSpec::numeric("b", None),
                FeatureSpec::numeric("unused", None),
            ]),
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
                    cover: 6.0,
                },
                Node::Leaf {
                    value: -1.0,
                    cover: 4.0,
                },
            ])],
        };
        let model = GradientBoostedModel::from_artifact(&artifact);
        let expectations: Vec<Vec<f64>> =
            model.trees().iter().map(|tree| tree.expectations()).collect();

        let attribution = attribute_margin(&model, &expectations, &[0.2, 3.0, 99.0]);
        assert!(attribution.contributions[0].abs() > 0.0);
        assert_eq!(attribution.contributions[1], 0.0);
        assert_eq!(attribution.contributions[2], 0.0);
    }
}
