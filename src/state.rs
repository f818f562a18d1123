use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::LoadError;
use crate::model::{Classifier, RandomForest};

pub const MODEL_FILE: &str = "random_forest.json";
pub const FEATURE_ORDER_FILE: &str = "feature_order.json";

/// Locations of the artifacts read at startup.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub feature_order: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            model: dir.join(MODEL_FILE),
            feature_order: dir.join(FEATURE_ORDER_FILE),
        }
    }
}

/// Process-wide state handed to every request handler.
///
/// Built once before the listener starts and never mutated afterwards, so
/// clones share the same model and feature order without locking.
#[derive(Clone, Default)]
pub struct AppState {
    pub model: Option<Arc<dyn Classifier>>,
    pub feature_order: Option<Arc<Vec<String>>>,
}

impl AppState {
    pub fn new(model: Arc<dyn Classifier>, feature_order: Option<Vec<String>>) -> Self {
        Self {
            model: Some(model),
            feature_order: feature_order.map(Arc::new),
        }
    }

    /// Load the random forest and, if present, the feature order.
    ///
    /// A missing model file is an error; a missing feature order file is not.
    pub fn load(paths: &ArtifactPaths) -> Result<Self, LoadError> {
        if !paths.model.is_file() {
            return Err(LoadError::ModelNotFound(paths.model.clone()));
        }
        let forest: RandomForest = read_json(&paths.model)?;

        let feature_order = if paths.feature_order.is_file() {
            Some(read_json::<Vec<String>>(&paths.feature_order)?)
        } else {
            tracing::info!(path = %paths.feature_order.display(), "No feature order file, continuing without it");
            None
        };

        tracing::info!("=== Random Forest loaded ===");
        tracing::info!("n_features_in: {:?}", forest.n_features_in());
        tracing::info!("classes: {:?}", forest.classes());
        tracing::info!("estimators: {}", forest.estimators().len());

        Ok(Self::new(Arc::new(forest), feature_order))
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_some()
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let raw = fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
