pub mod features;
pub mod health;
pub mod predict;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

pub use features::{feature_order, FeatureOrderResponse};
pub use health::{health_check, HealthResponse};
pub use predict::{predict, Features, PredictRequest, PredictResponse};

/// Endpoints served by the application, as `(method, path, description)`.
pub const ENDPOINTS: &[(&str, &str, &str)] = &[
    ("GET", "/health", "Health check"),
    ("GET", "/feature_order", "Feature order expected by the model"),
    ("POST", "/predict", "Classify one feature vector"),
];

pub fn create_router(state: AppState) -> Router {
    // Permissive CORS for browser clients on any origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/feature_order", get(feature_order))
        .route("/predict", post(predict))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
