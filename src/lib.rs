//! Inference server for a single pre-trained random forest classifier.
//!
//! The model is loaded once at startup into an [`AppState`] and served over
//! three endpoints: `GET /health`, `GET /feature_order` and `POST /predict`.

pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod state;

pub use api::create_router;
pub use config::ServerConfig;
pub use error::{ApiError, LoadError};
pub use model::{Classifier, RandomForest};
pub use state::{AppState, ArtifactPaths};
