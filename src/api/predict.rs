use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::model::Classifier;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub features: Features,
    #[serde(default = "default_return_proba")]
    pub return_proba: bool,
}

fn default_return_proba() -> bool {
    true
}

/// Feature vector of a prediction request. Never empty: an empty list is
/// rejected while the request body is deserialized.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Vec<f64>")]
pub struct Features(Vec<f64>);

impl TryFrom<Vec<f64>> for Features {
    type Error = &'static str;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        if values.is_empty() {
            return Err("features list cannot be empty");
        }
        Ok(Self(values))
    }
}

impl Features {
    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub model: String,
    pub predicted_class: i64,
    /// Class label to probability. When the request sets `return_proba` to
    /// false this only maps the predicted class to 1.0, which is a
    /// placeholder and not a probability estimate.
    pub probabilities: BTreeMap<String, f64>,
    /// Highest class probability, or 1.0 when probabilities were skipped.
    pub confidence: f64,
    pub feature_order: Option<Arc<Vec<String>>>,
}

pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(req) = payload?;

    let model = state
        .model
        .as_deref()
        .ok_or_else(|| ApiError::Internal("Model not loaded".to_string()))?;

    let response = run_prediction(model, req, state.feature_order.clone())?;
    tracing::debug!(
        predicted_class = response.predicted_class,
        confidence = response.confidence,
        "Prediction served"
    );

    Ok(Json(response))
}

fn run_prediction(
    model: &dyn Classifier,
    req: PredictRequest,
    feature_order: Option<Arc<Vec<String>>>,
) -> Result<PredictResponse, ApiError> {
    let features = req.features.into_inner();
    let actual = features.len();
    if let Some(expected) = model.n_features_in() {
        if expected != actual {
            return Err(ApiError::BadRequest(format!(
                "Model expects {} features, but got {}",
                expected, actual
            )));
        }
    }

    let x = Array2::from_shape_vec((1, actual), features)
        .map_err(|e| prediction_failed(format!("Prediction failed: {}", e)))?;

    let predicted_class = model
        .predict(x.view())
        .map_err(|e| prediction_failed(format!("Prediction failed: {}", e)))?
        .get(0)
        .copied()
        .ok_or_else(|| prediction_failed("Prediction failed: model returned no label".to_string()))?;

    let (probabilities, confidence) = if req.return_proba {
        let proba = model
            .predict_proba(x.view())
            .map_err(|e| prediction_failed(format!("predict_proba failed: {}", e)))?;
        let row = proba
            .outer_iter()
            .next()
            .ok_or_else(|| prediction_failed("predict_proba failed: model returned no rows".to_string()))?;

        let probabilities: BTreeMap<String, f64> = model
            .classes()
            .iter()
            .zip(row.iter())
            .map(|(class, p)| (class.to_string(), *p))
            .collect();
        let confidence = row.iter().copied().reduce(f64::max).unwrap_or(0.0);
        (probabilities, confidence)
    } else {
        (BTreeMap::from([(predicted_class.to_string(), 1.0)]), 1.0)
    };

    Ok(PredictResponse {
        model: model.name().to_string(),
        predicted_class,
        probabilities,
        confidence,
        feature_order,
    })
}

fn prediction_failed(message: String) -> ApiError {
    tracing::error!("{}", message);
    ApiError::Internal(message)
}
