//! HTTP handlers, one module per route group.

use axum::{
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

pub mod analytics;
pub mod auth;
pub mod contact;
pub mod events;
pub mod hospital;
pub mod predict;
pub mod realtime;

/// JSON extractor that reports malformed or incomplete bodies as a 400
/// validation error instead of axum's default 422.
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(AppError::validation(rejection.body_text())),
        }
    }
}
