//! Real-time donation/request recording and the live dashboard.
//!
//! Recording cascades: persist the record, apply the inventory delta, append
//! the training row, trigger the external model refresh. The record is the
//! durability boundary; every later step is best-effort and only logged on
//! failure.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Duration, Local, LocalResult, NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::{
    dataset::trigger_model_refresh,
    error::AppError,
    models::{
        BloodType, DonationRecord, DonationType, EventKind, Gender, RequestRecord, Urgency, Weather,
    },
    state::AppState,
    store::new_id,
};

use super::AppJson;

const MAX_UNITS_COLLECTED: i64 = 5;
const MAX_UNITS_REQUIRED: i64 = 20;
const CITY_LIMIT: i64 = 10;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationPayload {
    pub donor_id: String,
    pub donor_name: String,
    pub blood_type: BloodType,
    pub city: String,
    pub state: String,
    pub hospital_id: String,
    pub hospital_name: String,
    pub units_collected: Option<i64>,
    pub donation_type: Option<DonationType>,
    pub donor_age: i64,
    pub donor_gender: Gender,
    pub is_emergency: Option<bool>,
    pub weather: Option<Weather>,
    pub event_type: Option<EventKind>,
}

pub async fn record_donation(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<DonationPayload>,
) -> Result<impl IntoResponse, AppError> {
    let units = payload.units_collected.unwrap_or(1);
    if !(1..=MAX_UNITS_COLLECTED).contains(&units) {
        return Err(AppError::validation(format!(
            "unitsCollected must be between 1 and {MAX_UNITS_COLLECTED}"
        )));
    }

    let now = Utc::now();
    let record = DonationRecord {
        id: new_id(),
        donor_id: payload.donor_id,
        donor_name: payload.donor_name,
        blood_type: payload.blood_type,
        city: payload.city,
        state: payload.state,
        hospital_id: payload.hospital_id,
        hospital_name: payload.hospital_name,
        donation_date: now,
        units_collected: units,
        donation_type: payload.donation_type.unwrap_or(DonationType::WholeBlood),
        donor_age: payload.donor_age,
        donor_gender: payload.donor_gender,
        is_emergency: payload.is_emergency.unwrap_or(false),
        weather: payload.weather.unwrap_or(Weather::Sunny),
        event_type: payload.event_type.unwrap_or(EventKind::Regular),
        created_at: now,
    };

    state.store.insert_donation_record(&record).await?;

    if let Err(err) = state
        .store
        .add_stock(&record.hospital_id, record.blood_type, units)
        .await
    {
        warn!(error = %err, hospital = %record.hospital_id, "inventory update failed");
    }

    state.datasets.record_donation(&record).await;
    trigger_model_refresh(&state.config.python_bin, &state.config.data_dir);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Blood donation recorded successfully",
            "donation": record,
        })),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    pub requester_id: String,
    pub requester_name: String,
    pub blood_type: BloodType,
    pub city: String,
    pub state: String,
    pub hospital_id: String,
    pub hospital_name: String,
    pub units_required: i64,
    pub urgency_level: Urgency,
    pub patient_age: i64,
    pub patient_gender: Gender,
    pub medical_condition: String,
}

pub async fn record_request(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<RequestPayload>,
) -> Result<impl IntoResponse, AppError> {
    let units = payload.units_required;
    if !(1..=MAX_UNITS_REQUIRED).contains(&units) {
        return Err(AppError::validation(format!(
            "unitsRequired must be between 1 and {MAX_UNITS_REQUIRED}"
        )));
    }

    let now = Utc::now();
    let mut record = RequestRecord {
        id: new_id(),
        requester_id: payload.requester_id,
        requester_name: payload.requester_name,
        blood_type: payload.blood_type,
        city: payload.city,
        state: payload.state,
        hospital_id: payload.hospital_id,
        hospital_name: payload.hospital_name,
        request_date: now,
        units_required: units,
        urgency_level: payload.urgency_level,
        patient_age: payload.patient_age,
        patient_gender: payload.patient_gender,
        medical_condition: payload.medical_condition,
        is_fulfilled: false,
        fulfilled_date: None,
        fulfilled_units: 0,
        created_at: now,
    };

    state.store.insert_request_record(&record).await?;

    // Availability at the time of the check goes back to the caller even when
    // the reservation itself later loses a race.
    let available = match state
        .store
        .stock_level(&record.hospital_id, record.blood_type)
        .await
    {
        Ok(stock) => stock,
        Err(err) => {
            warn!(error = %err, "availability check failed");
            0
        }
    };

    if available >= units {
        let reserved = state
            .store
            .reserve_stock(&record.hospital_id, record.blood_type, units)
            .await
            .unwrap_or_else(|err| {
                warn!(error = %err, "inventory reservation failed");
                false
            });
        if reserved {
            let fulfilled_at = Utc::now();
            match state
                .store
                .mark_request_fulfilled(&record.id, units, fulfilled_at)
                .await
            {
                Ok(()) => {
                    record.is_fulfilled = true;
                    record.fulfilled_date = Some(fulfilled_at);
                    record.fulfilled_units = units;
                }
                Err(err) => {
                    // The stored record still says unfulfilled, so the ledger
                    // must not keep the subtraction. Put the units back and
                    // report the request unfulfilled.
                    warn!(error = %err, request = %record.id, "fulfillment write failed");
                    if let Err(err) = state
                        .store
                        .add_stock(&record.hospital_id, record.blood_type, units)
                        .await
                    {
                        warn!(error = %err, "could not return reserved units");
                    }
                }
            }
        }
    }

    state.datasets.record_request(&record).await;
    trigger_model_refresh(&state.config.python_bin, &state.config.data_dir);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Blood request recorded successfully",
            "request": record,
            "availableStock": available,
            "isFulfilled": record.is_fulfilled,
        })),
    ))
}

pub async fn inventory(
    State(state): State<Arc<AppState>>,
    Path(hospital_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let rows = state.store.hospital_inventory(&hospital_id).await?;
    Ok(Json(json!({ "success": true, "inventory": rows })))
}

/// Midnight of the local calendar day, in UTC. Falls back to the current
/// instant if the local zone skips midnight (DST gap).
fn start_of_today() -> DateTime<Utc> {
    let midnight = Local::now().date_naive().and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&midnight) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        LocalResult::None => Utc::now(),
    }
}

pub async fn dashboard(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let today = start_of_today();
    let last_week = Utc::now() - Duration::days(7);
    let last_month = Utc::now() - Duration::days(30);

    let today_donations = state.store.donations_since(today).await?;
    let today_requests = state.store.requests_since(today).await?;
    let weekly_donations = state.store.donation_trend(last_week).await?;
    let weekly_requests = state.store.request_trend(last_week).await?;
    let blood_type_stats = state.store.blood_type_distribution(last_month).await?;
    let city_stats = state.store.city_distribution(last_month, CITY_LIMIT).await?;
    let critical_requests = state.store.critical_request_count().await?;

    let blood_type_stats: Vec<_> = blood_type_stats
        .into_iter()
        .map(|g| json!({ "bloodType": g.key, "donations": g.donations, "units": g.units }))
        .collect();
    let city_stats: Vec<_> = city_stats
        .into_iter()
        .map(|g| json!({ "city": g.key, "donations": g.donations, "units": g.units }))
        .collect();

    Ok(Json(json!({
        "success": true,
        "realTimeStats": {
            "todayDonations": today_donations,
            "todayRequests": today_requests,
            "criticalRequests": critical_requests,
            "weeklyDonations": weekly_donations,
            "weeklyRequests": weekly_requests,
            "bloodTypeStats": blood_type_stats,
            "cityStats": city_stats,
        },
    })))
}
