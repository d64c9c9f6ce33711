//! Hospital registration, upserted by `hospitalId`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{error::AppError, models::Hospital, state::AppState, store::new_id};

use super::AppJson;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub hospital_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    #[serde(default)]
    pub beds: i64,
    #[serde(default)]
    pub rooms: i64,
    pub status: Option<String>,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<RegisterPayload>,
) -> Result<impl IntoResponse, AppError> {
    if payload.hospital_id.trim().is_empty() {
        return Err(AppError::validation("hospitalId is required"));
    }

    let hospital = Hospital {
        id: new_id(),
        hospital_id: payload.hospital_id,
        name: payload.name,
        email: payload.email,
        phone: payload.phone,
        address: payload.address,
        city: payload.city,
        state: payload.state,
        pincode: payload.pincode,
        beds: payload.beds,
        rooms: payload.rooms,
        status: payload.status.unwrap_or_else(|| "active".to_string()),
        registered_at: Utc::now(),
    };

    let (stored, updated) = state.store.upsert_hospital(&hospital).await?;
    if updated {
        Ok((
            StatusCode::OK,
            Json(json!({ "message": "Hospital updated", "hospital": stored })),
        ))
    } else {
        Ok((
            StatusCode::CREATED,
            Json(json!({ "message": "Hospital registered", "hospital": stored })),
        ))
    }
}

pub async fn fetch(
    State(state): State<Arc<AppState>>,
    Path(hospital_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let hospital = state
        .store
        .hospital(&hospital_id)
        .await?
        .ok_or(AppError::NotFound("Not found"))?;
    Ok(Json(hospital))
}
