//! Signup, login, and the bearer-protected user surface.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{
    auth::{hash_password, issue_token, verify_password, AuthUser},
    error::AppError,
    models::{Donation, User},
    state::AppState,
    store::new_id,
};

use super::AppJson;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupPayload {
    pub fullname: String,
    pub username: String,
    pub password: String,
    pub phone: String,
    pub address: String,
    pub preferred_hospital: Option<String>,
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<SignupPayload>,
) -> Result<impl IntoResponse, AppError> {
    if state
        .store
        .user_by_username(&payload.username)
        .await?
        .is_some()
    {
        return Err(AppError::UserExists);
    }

    let user = User {
        id: new_id(),
        fullname: payload.fullname,
        username: payload.username,
        password: hash_password(&payload.password)?,
        phone: payload.phone,
        address: payload.address,
        preferred_hospital: payload.preferred_hospital,
        donation_count: 0,
        created_at: Utc::now(),
    };
    state.store.insert_user(&user).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered" })),
    ))
}

#[derive(Deserialize)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<LoginPayload>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store
        .user_by_username(&payload.username)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !verify_password(&payload.password, &user.password)? {
        return Err(AppError::InvalidCredentials);
    }

    let token = issue_token(&user.id, &state.config.jwt_secret)?;
    Ok(Json(json!({ "message": "Login successful", "token": token })))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    info!(user_id = %auth.user_id, "fetching user details");
    let user = state
        .store
        .user_by_id(&auth.user_id)
        .await?
        .ok_or(AppError::NotFound("User not found"))?;
    Ok(Json(user))
}

#[derive(Deserialize)]
pub struct DonatePayload {
    pub blood_type: String,
    pub units: i64,
    pub donation_date: String,
    pub hospital: Option<String>,
}

fn parse_donation_date(raw: &str) -> Result<DateTime<Utc>, AppError> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|_| AppError::validation("Invalid donation_date"))
}

pub async fn donate(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    AppJson(payload): AppJson<DonatePayload>,
) -> Result<impl IntoResponse, AppError> {
    if payload.units <= 0 {
        return Err(AppError::validation("units must be positive"));
    }
    let donation_date = parse_donation_date(&payload.donation_date)?;

    // Atomic per-donor counter; concurrent donations get distinct values.
    let frequency = state.store.next_donation_frequency(&auth.user_id).await?;

    let donation = Donation {
        id: new_id(),
        donor: auth.user_id.clone(),
        blood_type: payload.blood_type,
        units: payload.units,
        donation_date,
        hospital: payload.hospital.unwrap_or_default(),
        frequency,
    };
    state.store.insert_donation(&donation).await?;

    state
        .datasets
        .record_transfusion(frequency, donation.units, &donation.blood_type, &auth.user_id)
        .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Donation saved in DB and CSV!" })),
    ))
}

#[derive(Serialize)]
struct DonorRef {
    id: String,
    fullname: String,
}

#[derive(Serialize)]
struct DonationView {
    #[serde(flatten)]
    donation: Donation,
    donor_details: DonorRef,
}

/// The logged-in donor's own donation history, served uncached so the
/// dashboard poll always sees fresh data.
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Response, AppError> {
    let user = state
        .store
        .user_by_id(&auth.user_id)
        .await?
        .ok_or(AppError::NotFound("User not found"))?;
    let donations = state.store.donations_for_donor(&auth.user_id).await?;

    let views: Vec<DonationView> = donations
        .into_iter()
        .map(|donation| DonationView {
            donation,
            donor_details: DonorRef {
                id: user.id.clone(),
                fullname: user.fullname.clone(),
            },
        })
        .collect();

    let mut response = Json(views).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, proxy-revalidate"),
    );
    response
        .headers_mut()
        .insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
        .headers_mut()
        .insert(header::EXPIRES, HeaderValue::from_static("0"));
    Ok(response)
}
