//! Contact-form messages.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{error::AppError, models::ContactMessage, state::AppState, store::new_id};

use super::AppJson;

#[derive(Deserialize)]
pub struct ContactPayload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub message: String,
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<ContactPayload>,
) -> Result<impl IntoResponse, AppError> {
    if payload.name.trim().is_empty()
        || payload.email.trim().is_empty()
        || payload.message.trim().is_empty()
    {
        return Err(AppError::validation("All fields are required."));
    }

    let message = ContactMessage {
        id: new_id(),
        name: payload.name,
        email: payload.email,
        message: payload.message,
        created_at: Utc::now(),
    };
    state.store.insert_contact(&message).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Contact message received." })),
    ))
}
