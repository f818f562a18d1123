use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct FeatureOrderResponse {
    pub feature_order: Arc<Vec<String>>,
}

/// Order of the features the model expects. Informational only, meant for
/// debugging and for clients that build the feature vector from a form.
pub async fn feature_order(State(state): State<AppState>) -> Result<Json<FeatureOrderResponse>, ApiError> {
    let feature_order = state
        .feature_order
        .clone()
        .ok_or_else(|| ApiError::NotFound("feature_order.json not found".to_string()))?;

    Ok(Json(FeatureOrderResponse { feature_order }))
}
