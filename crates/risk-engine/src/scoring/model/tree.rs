use serde::{Deserialize, Serialize};

/// One node of a trained binary decision tree. The root lives at index 0 and
/// children are referenced by index into the owning tree's node vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Split {
        /// Index into the feature vector.
        feature: usize,
        /// Values `<= threshold` route left.
        threshold: f64,
        left: usize,
        right: usize,
        /// Training-sample weight that reached this node.
        cover: f64,
    },
    Leaf {
        /// Raw margin contribution of this leaf.
        value: f64,
        cover: f64,
    },
}

/// A single regression tree from the boosted ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<Node>,
}

impl DecisionTree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Walks the tree for one feature vector and returns the leaf margin.
    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value, .. } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    index = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Cover-weighted expected margin at every node.
    ///
    /// The attribution pass reads these as it walks a decision path: each
    /// split contributes the change in expectation between parent and chosen
    /// child.
    pub fn expectations(&self) -> Vec<f64> {
        let mut expectations = vec![0.0; self.nodes.len()];
        if !self.nodes.is_empty() {
            self.fill_expectation(0, &mut expectations);
        }
        expectations
    }

    fn fill_expectation(&self, index: usize, expectations: &mut [f64]) -> f64 {
        let expected = match &self.nodes[index] {
            Node::Leaf { value, .. } => *value,
            Node::Split { left, right, .. } => {
                let (left, right) = (*left, *right);
                let left_expected = self.fill_expectation(left, expectations);
                let right_expected = self.fill_expectation(right, expectations);
                let left_cover = self.cover_at(left);
                let right_cover = self.cover_at(right);
                let total = left_cover + right_cover;
                if total > 0.0 {
                    (left_cover * left_expected + right_cover * right_expected) / total
                } else {
                    0.5 * (left_expected + right_expected)
                }
            }
        };
        expectations[index] = expected;
        expected
    }

    pub(crate) fn cover_at(&self, index: usize) -> f64 {
        match &self.nodes[index] {
            Node::Leaf { cover, .. } | Node::Split { cover, .. } => *cover,
        }
    }

    /// Structural validation run once at artifact load so a corrupt tree
    /// fails loudly instead of misrouting features at request time.
    pub fn validate(&self, n_features: usize) -> Result<(), TreeStructureError> {
        if self.nodes.is_empty() {
            return Err(TreeStructureError::Empty);
        }

        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { value, cover } => {
                    if !value.is_finite() || !cover.is_finite() || *cover < 0.0 {
                        return Err(TreeStructureError::InvalidNode { index });
                    }
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    cover,
                } => {
                    if *feature >= n_features {
                        return Err(TreeStructureError::FeatureOutOfRange {
                            index,
                            feature: *feature,
                            n_features,
                        });
                    }
                    if *left >= self.nodes.len() || *right >= self.nodes.len() {
                        return Err(TreeStructureError::ChildOutOfRange { index });
                    }
                    // Children must point forward, which also rules out cycles.
                    if *left <= index || *right <= index {
                        return Err(TreeStructureError::ChildOutOfRange { index });
                    }
                    if !threshold.is_finite() || !cover.is_finite() || *cover < 0.0 {
                        return Err(TreeStructureError::InvalidNode { index });
                    }
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeStructureError {
    #[error("tree has no nodes")]
    Empty,
    #[error("node {index} references feature {feature} outside the schema of {n_features}")]
    FeatureOutOfRange {
        index: usize,
        feature: usize,
        n_features: usize,
    },
    #[error("node {index} references a child outside the tree")]
    ChildOutOfRange { index: usize },
    #[error("node {index} carries a non-finite threshold, value, or cover")]
    InvalidNode { index: usize },
}
