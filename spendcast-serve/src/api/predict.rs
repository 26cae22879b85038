//! Prediction endpoints
//!
//! Both endpoints take one snapshot at the start of the request and use it
//! throughout, so a concurrent reload cannot mix two model versions.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Form, Json,
};
use serde::Serialize;
use spendcast_common::model::FeatureEncoder;
use spendcast_common::{Error, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::api::ui::render_page;
use crate::error::ApiResult;
use crate::AppState;

/// Shown in place of a prediction when no model is active
pub const NO_MODEL_MESSAGE: &str = "No model available yet.";

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub prediction: Option<f64>,
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// POST /predict (form-encoded)
///
/// Renders the page with `Predicted Avg 7-Day Spend: <value>`, or the
/// no-model message. Missing or unparsable fields give a 400 page.
pub async fn predict_form(State(state): State<AppState>, Form(fields): Form<HashMap<String, String>>) -> Response {
    let snapshot = state.serving.snapshot().await;
    let values: BTreeMap<String, String> = fields.into_iter().collect();

    let Some(model) = snapshot.model() else {
        return Html(render_page(&state, &snapshot, &values, Some(NO_MODEL_MESSAGE))).into_response();
    };

    let mut inputs: BTreeMap<String, Value> = values
        .iter()
        .map(|(k, v)| (k.clone(), Value::Text(v.clone())))
        .collect();
    // Unchecked checkboxes are not submitted at all
    for encoder in &model.encoders {
        if let FeatureEncoder::Flag { name } = encoder {
            inputs
                .entry(name.clone())
                .or_insert_with(|| Value::Text("false".to_string()));
        }
    }

    match model.predict_one(&inputs) {
        Ok(prediction) => {
            debug!("Form prediction {:.4} from {:?}", prediction, snapshot.active_version());
            let message = format!("Predicted Avg 7-Day Spend: {:.2}", prediction);
            Html(render_page(&state, &snapshot, &values, Some(&message))).into_response()
        }
        Err(Error::InvalidInput(reason)) => {
            let message = format!("Invalid input: {}", reason);
            (
                StatusCode::BAD_REQUEST,
                Html(render_page(&state, &snapshot, &values, Some(&message))),
            )
                .into_response()
        }
        Err(e) => crate::ApiError::from(e).into_response(),
    }
}

/// POST /api/predict (JSON object of feature values)
pub async fn predict_json(
    State(state): State<AppState>,
    Json(inputs): Json<BTreeMap<String, Value>>,
) -> ApiResult<Json<PredictResponse>> {
    let snapshot = state.serving.snapshot().await;

    let Some(model) = snapshot.model() else {
        return Ok(Json(PredictResponse {
            prediction: None,
            version: None,
            message: Some(NO_MODEL_MESSAGE.to_string()),
        }));
    };

    let prediction = model.predict_one(&inputs)?;
    Ok(Json(PredictResponse {
        prediction: Some(prediction),
        version: snapshot.active_version().map(str::to_string),
        message: None,
    }))
}
