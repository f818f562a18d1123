//! Classifier abstraction served by the prediction endpoint.
//!
//! Handlers only see [`Classifier`] trait objects.

pub mod forest;

use ndarray::{Array1, Array2, ArrayView2};
use thiserror::Error;

pub use forest::{DecisionTree, ForestError, Node, RandomForest};

/// Errors raised while running inference on an already loaded model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("X has {actual} features, but the model is expecting {expected} features as input")]
    FeatureCount { expected: usize, actual: usize },

    #[error("Input contains NaN or infinity")]
    NonFinite,
}

/// A fitted classification model.
///
/// Implementations are shared read-only between concurrent requests, hence
/// the `Send + Sync` bound. A model that needs interior mutability during
/// inference has to guard it with its own lock.
pub trait Classifier: Send + Sync {
    /// Identifier reported back to clients in prediction responses.
    fn name(&self) -> &str;

    /// Number of input columns the model was fitted on, when known.
    fn n_features_in(&self) -> Option<usize>;

    /// Class labels in the column order used by [`Classifier::predict_proba`].
    fn classes(&self) -> &[i64];

    /// Predicted class label for every row of `x`.
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<i64>, ModelError>;

    /// Class probabilities for every row of `x`, one column per class.
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError>;
}
