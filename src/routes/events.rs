//! Donation-camp event requests submitted by hospitals, listed newest first.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{error::AppError, models::EventRequest, state::AppState, store::new_id};

use super::AppJson;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequestPayload {
    pub hospital_name: String,
    pub hospital_address: String,
    pub preferred_date: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub additional_details: Option<String>,
}

pub async fn list(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let requests = state.store.event_requests().await?;
    Ok(Json(requests))
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<EventRequestPayload>,
) -> Result<impl IntoResponse, AppError> {
    let request = EventRequest {
        id: new_id(),
        hospital_name: payload.hospital_name,
        hospital_address: payload.hospital_address,
        preferred_date: payload.preferred_date,
        contact_name: payload.contact_name,
        contact_phone: payload.contact_phone,
        additional_details: payload.additional_details,
        created_at: Utc::now(),
    };
    state.store.insert_event_request(&request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Event request submitted!" })),
    ))
}
