//! Pass-through to the external prediction service. No retries and no
//! circuit breaking: one failed call is one 500.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use tracing::warn;

use crate::state::AppState;

use super::AppJson;

pub async fn proxy(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<Value>,
) -> impl IntoResponse {
    let unavailable = || {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Prediction service unavailable." })),
        )
    };

    let response = match state
        .http
        .post(&state.config.predict_url)
        .json(&body)
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "prediction service unreachable");
            return unavailable();
        }
    };

    let status =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    match response.json::<Value>().await {
        Ok(payload) => (status, Json(payload)),
        Err(err) => {
            warn!(error = %err, "prediction service returned a non-JSON body");
            unavailable()
        }
    }
}
