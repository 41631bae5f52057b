use crate::scoring::model::{DecisionTree, Node};

/// Aggregate split gain per feature across the ensemble.
///
/// Gain at a split is the cover-weighted squared separation between its
/// children's expected margins, the quantity the training objective reduced
/// when it chose the split. Summed per feature and normalized this ranks
/// features by their average influence over the training population.
pub(crate) fn aggregate_gain(
    trees: &[DecisionTree],
    expectations: &[Vec<f64>],
    n_features: usize,
) -> Vec<f64> {
    let mut gains = vec![0.0; n_features];

    for (tree, tree_expectations) in trees.iter().zip(expectations) {
        for node in &tree.nodes {
            if let Node::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                let left_cover = tree.cover_at(*left);
                let right_cover = tree.cover_at(*right);
                let total = left_cover + right_cover;
                if total <= 0.0 {
                    continue;
                }
                let separation = tree_expectations[*left] - tree_expectations[*right];
                gains[*feature] += left_cover * right_cover / total * separation * separation;
            }
        }
    }

    let sum: f64 = gains.iter().sum();
    if sum > 0.0 {
        for gain in &mut gains {
            *gain /= sum;
        }
    }

    gains
}
