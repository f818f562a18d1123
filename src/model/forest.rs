//! Random forest classifier read from a JSON artifact.
//!
//! The artifact mirrors the fitted attributes of a scikit-learn
//! `RandomForestClassifier`: the input width, the class labels and one node
//! array per estimator. Leaves store per-class sample weights; they are
//! normalized to probabilities once, while the artifact is deserialized.

use std::collections::HashSet;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::Deserialize;
use thiserror::Error;

use super::{Classifier, ModelError};

const MODEL_NAME: &str = "random_forest";

/// Structural problems found while deserializing a forest artifact.
#[derive(Debug, Error, PartialEq)]
pub enum ForestError {
    #[error("forest declares no input features")]
    NoFeatures,

    #[error("forest declares no classes")]
    NoClasses,

    #[error("class label {0} is listed more than once")]
    DuplicateClass(i64),

    #[error("forest has no estimators")]
    NoEstimators,

    #[error("tree {tree} has no nodes")]
    EmptyTree { tree: usize },

    #[error("tree {tree} node {node} splits on feature {feature}, but the forest has {n_features} features")]
    FeatureOutOfRange {
        tree: usize,
        node: usize,
        feature: usize,
        n_features: usize,
    },

    #[error("tree {tree} node {node} points to invalid child {child}")]
    ChildOutOfRange { tree: usize, node: usize, child: usize },

    #[error("tree {tree} leaf {node} has {actual} values, expected one per class ({expected})")]
    LeafWidth {
        tree: usize,
        node: usize,
        expected: usize,
        actual: usize,
    },

    #[error("tree {tree} leaf {node} must hold finite, non-negative weights with a positive sum")]
    InvalidLeaf { tree: usize, node: usize },
}

/// A node in a decision tree.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Node {
    /// Internal split node. Rows with `row[feature] <= threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Leaf node holding one weight (after loading, one probability) per class.
    Leaf { value: Vec<f64> },
}

impl Node {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf { .. })
    }
}

/// One estimator of the forest. Node 0 is the root.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Walk the tree for one row and return the class distribution of the
    /// leaf it lands in.
    ///
    /// Only valid on trees checked by [`DecisionTree::validate`].
    pub fn leaf_value(&self, row: ArrayView1<'_, f64>) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
                Node::Leaf { value } => return value,
            }
        }
    }

    /// Check the node array and normalize every leaf to sum to 1.
    ///
    /// Children must come after their parent, which rules out cycles and
    /// matches the depth-first layout scikit-learn writes.
    fn validate(&mut self, tree: usize, n_features: usize, n_classes: usize) -> Result<(), ForestError> {
        if self.nodes.is_empty() {
            return Err(ForestError::EmptyTree { tree });
        }

        let len = self.nodes.len();
        for (node, entry) in self.nodes.iter_mut().enumerate() {
            match entry {
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= n_features {
                        return Err(ForestError::FeatureOutOfRange {
                            tree,
                            node,
                            feature: *feature,
                            n_features,
                        });
                    }
                    for child in [*left, *right] {
                        if child <= node || child >= len {
                            return Err(ForestError::ChildOutOfRange { tree, node, child });
                        }
                    }
                }
                Node::Leaf { value } => {
                    if value.len() != n_classes {
                        return Err(ForestError::LeafWidth {
                            tree,
                            node,
                            expected: n_classes,
                            actual: value.len(),
                        });
                    }
                    if value.iter().any(|w| !w.is_finite() || *w < 0.0) {
                        return Err(ForestError::InvalidLeaf { tree, node });
                    }
                    let total: f64 = value.iter().sum();
                    if total <= 0.0 {
                        return Err(ForestError::InvalidLeaf { tree, node });
                    }
                    value.iter_mut().for_each(|w| *w /= total);
                }
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct ForestArtifact {
    n_features_in: usize,
    classes: Vec<i64>,
    estimators: Vec<DecisionTree>,
}

/// Random forest classifier: the average of its trees' leaf distributions.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "ForestArtifact")]
pub struct RandomForest {
    n_features_in: usize,
    classes: Vec<i64>,
    estimators: Vec<DecisionTree>,
}

impl TryFrom<ForestArtifact> for RandomForest {
    type Error = ForestError;

    fn try_from(artifact: ForestArtifact) -> Result<Self, Self::Error> {
        Self::new(artifact.n_features_in, artifact.classes, artifact.estimators)
    }
}

impl RandomForest {
    /// Build a forest from raw trees, validating their structure.
    pub fn new(
        n_features_in: usize,
        classes: Vec<i64>,
        mut estimators: Vec<DecisionTree>,
    ) -> Result<Self, ForestError> {
        if n_features_in == 0 {
            return Err(ForestError::NoFeatures);
        }
        if classes.is_empty() {
            return Err(ForestError::NoClasses);
        }
        let mut seen = HashSet::with_capacity(classes.len());
        if let Some(dup) = classes.iter().find(|c| !seen.insert(**c)) {
            return Err(ForestError::DuplicateClass(*dup));
        }
        if estimators.is_empty() {
            return Err(ForestError::NoEstimators);
        }
        for (tree, estimator) in estimators.iter_mut().enumerate() {
            estimator.validate(tree, n_features_in, classes.len())?;
        }

        Ok(Self {
            n_features_in,
            classes,
            estimators,
        })
    }

    pub fn estimators(&self) -> &[DecisionTree] {
        &self.estimators
    }

    fn check_input(&self, x: &ArrayView2<'_, f64>) -> Result<(), ModelError> {
        if x.ncols() != self.n_features_in {
            return Err(ModelError::FeatureCount {
                expected: self.n_features_in,
                actual: x.ncols(),
            });
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite);
        }
        Ok(())
    }
}

impl Classifier for RandomForest {
    fn name(&self) -> &str {
        MODEL_NAME
    }

    fn n_features_in(&self) -> Option<usize> {
        Some(self.n_features_in)
    }

    fn classes(&self) -> &[i64] {
        &self.classes
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<i64>, ModelError> {
        let proba = self.predict_proba(x)?;
        let labels = proba
            .rows()
            .into_iter()
            .map(|row| {
                // first maximum wins on ties
                let best = row
                    .iter()
                    .enumerate()
                    .fold(0, |best, (i, p)| if *p > row[best] { i } else { best });
                self.classes[best]
            })
            .collect();
        Ok(labels)
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        self.check_input(&x)?;

        let mut proba = Array2::<f64>::zeros((x.nrows(), self.classes.len()));
        for (row, mut out) in x.rows().into_iter().zip(proba.rows_mut()) {
            for tree in &self.estimators {
                for (acc, p) in out.iter_mut().zip(tree.leaf_value(row)) {
                    *acc += p;
                }
            }
        }
        proba /= self.estimators.len() as f64;
        Ok(proba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use serde_json::json;

    fn stump(feature: usize, threshold: f64, left: Vec<f64>, right: Vec<f64>) -> DecisionTree {
        DecisionTree::new(vec![
            Node::Split {
                feature,
                threshold,
                left: 1,
                right: 2,
            },
            Node::Leaf { value: left },
            Node::Leaf { value: right },
        ])
    }

    fn two_class_forest() -> RandomForest {
        RandomForest::new(
            2,
            vec![0, 1],
            vec![
                stump(0, 0.5, vec![10.0, 0.0], vec![0.0, 10.0]),
                stump(1, 0.5, vec![3.0, 1.0], vec![1.0, 3.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn deserializes_artifact_json() {
        let forest: RandomForest = serde_json::from_value(json!({
            "n_features_in": 4,
            "classes": [0, 1, 2],
            "estimators": [{
                "nodes": [
                    { "feature": 2, "threshold": 2.45, "left": 1, "right": 2 },
                    { "value": [50.0, 0.0, 0.0] },
                    { "value": [0.0, 50.0, 50.0] }
                ]
            }]
        }))
        .unwrap();

        assert_eq!(forest.n_features_in(), Some(4));
        assert_eq!(forest.classes(), &[0, 1, 2]);
        assert!(!forest.estimators()[0].nodes()[0].is_leaf());
        assert!(forest.estimators()[0].nodes()[1].is_leaf());

        let x = array![[5.1, 3.5, 1.4, 0.2]];
        assert_eq!(forest.predict(x.view()).unwrap().to_vec(), vec![0]);
        assert_eq!(forest.predict_proba(x.view()).unwrap(), array![[1.0, 0.0, 0.0]]);
    }

    #[test]
    fn averages_leaf_distributions_across_trees() {
        let forest = two_class_forest();
        let proba = forest.predict_proba(array![[0.0, 0.0]].view()).unwrap();

        // tree 1 -> [1.0, 0.0], tree 2 -> [0.75, 0.25]
        assert!((proba[[0, 0]] - 0.875).abs() < 1e-12);
        assert!((proba[[0, 1]] - 0.125).abs() < 1e-12);
        assert!((proba.row(0).sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn predicts_every_row() {
        let forest = two_class_forest();
        let x = array![[0.0, 0.0], [1.0, 1.0], [0.2, 0.9]];
        assert_eq!(forest.predict(x.view()).unwrap().to_vec(), vec![0, 1, 0]);
    }

    #[test]
    fn threshold_equality_goes_left() {
        let tree = stump(0, 0.5, vec![1.0, 0.0], vec![0.0, 1.0]);
        assert_eq!(tree.leaf_value(array![0.5].view()), &[1.0, 0.0]);
        assert_eq!(tree.leaf_value(array![0.500001].view()), &[0.0, 1.0]);
    }

    #[test]
    fn ties_resolve_to_first_class() {
        let forest = RandomForest::new(1, vec![7, 3], vec![stump(0, 0.0, vec![1.0, 1.0], vec![0.0, 1.0])]).unwrap();
        assert_eq!(forest.predict(array![[-1.0]].view()).unwrap().to_vec(), vec![7]);
    }

    #[test]
    fn rejects_wrong_width_and_non_finite_input() {
        let forest = two_class_forest();

        let err = forest.predict(array![[1.0, 2.0, 3.0]].view()).unwrap_err();
        assert!(matches!(err, ModelError::FeatureCount { expected: 2, actual: 3 }));

        let err = forest.predict_proba(array![[f64::NAN, 0.0]].view()).unwrap_err();
        assert!(matches!(err, ModelError::NonFinite));
    }

    #[test]
    fn rejects_malformed_forests() {
        assert_eq!(
            RandomForest::new(0, vec![0], vec![stump(0, 0.0, vec![1.0], vec![1.0])]).unwrap_err(),
            ForestError::NoFeatures
        );
        assert_eq!(RandomForest::new(1, vec![], vec![]).unwrap_err(), ForestError::NoClasses);
        assert_eq!(
            RandomForest::new(1, vec![1, 2, 1], vec![]).unwrap_err(),
            ForestError::DuplicateClass(1)
        );
        assert_eq!(RandomForest::new(1, vec![0, 1], vec![]).unwrap_err(), ForestError::NoEstimators);
        assert_eq!(
            RandomForest::new(1, vec![0, 1], vec![DecisionTree::new(vec![])]).unwrap_err(),
            ForestError::EmptyTree { tree: 0 }
        );
        assert_eq!(
            RandomForest::new(1, vec![0, 1], vec![stump(3, 0.0, vec![1.0, 0.0], vec![0.0, 1.0])]).unwrap_err(),
            ForestError::FeatureOutOfRange {
                tree: 0,
                node: 0,
                feature: 3,
                n_features: 1
            }
        );
        assert_eq!(
            RandomForest::new(1, vec![0, 1], vec![stump(0, 0.0, vec![1.0], vec![0.0, 1.0])]).unwrap_err(),
            ForestError::LeafWidth {
                tree: 0,
                node: 1,
                expected: 2,
                actual: 1
            }
        );
        assert_eq!(
            RandomForest::new(1, vec![0, 1], vec![stump(0, 0.0, vec![0.0, 0.0], vec![0.0, 1.0])]).unwrap_err(),
            ForestError::InvalidLeaf { tree: 0, node: 1 }
        );
        assert_eq!(
            RandomForest::new(1, vec![0, 1], vec![stump(0, 0.0, vec![-1.0, 2.0], vec![0.0, 1.0])]).unwrap_err(),
            ForestError::InvalidLeaf { tree: 0, node: 1 }
        );
    }

    #[test]
    fn rejects_cyclic_and_dangling_children() {
        let cyclic = DecisionTree::new(vec![
            Node::Split {
                feature: 0,
                threshold: 0.0,
                left: 0,
                right: 1,
            },
            Node::Leaf { value: vec![1.0] },
        ]);
        assert_eq!(
            RandomForest::new(1, vec![0], vec![cyclic]).unwrap_err(),
            ForestError::ChildOutOfRange { tree: 0, node: 0, child: 0 }
        );

        let dangling: Result<RandomForest, _> = serde_json::from_value(json!({
            "n_features_in": 1,
            "classes": [0],
            "estimators": [{ "nodes": [{ "feature": 0, "threshold": 0.0, "left": 1, "right": 9 }, { "value": [1.0] }] }]
        }));
        let message = dangling.unwrap_err().to_string();
        assert!(message.contains("invalid child 9"), "{message}");
    }
}
