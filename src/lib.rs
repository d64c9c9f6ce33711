//! # DonorDirect backend
//!
//! Blood-donation coordination API: accounts and donation history, hospital
//! registration, contact and event-camp requests, real-time donation/request
//! recording with per-hospital inventory, and the demand-analytics surface.
//!
//!
//!
//! # Architecture
//!
//! - HTTP request → route handler → optional bearer check → store calls →
//!   JSON response. Handlers never block; every store call suspends.
//! - All persistence sits behind the `Store` trait. Production runs MongoDB;
//!   tests and `STORE=memory` run the in-process store.
//! - Recording a donation or request cascades into best-effort side effects
//!   (inventory delta, CSV training row, external model refresh). The stored
//!   record is the durability boundary; the rest may fail and only log.
//!
//!
//!
//! # Operations
//!
//! Configuration is environment variables with logged defaults, see
//! [`config::Config`]. The server binds `0.0.0.0:PORT` and exits non-zero if
//! the database cannot be reached at boot.

use std::time::Duration;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub mod auth;
pub mod config;
pub mod dataset;
pub mod error;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;

use config::Config;
use state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/signup", post(routes::auth::signup))
        .route("/api/login", post(routes::auth::login))
        .route("/api/me", get(routes::auth::me))
        .route("/api/donate", post(routes::auth::donate))
        .route("/api/dashboard", get(routes::auth::dashboard))
        .route("/api/hospitals/register", post(routes::hospital::register))
        .route("/api/hospitals/{hospital_id}", get(routes::hospital::fetch))
        .route("/api/contact", post(routes::contact::submit))
        .route(
            "/api/auth/requests",
            get(routes::events::list).post(routes::events::submit),
        )
        .route("/api/realtime/donation", post(routes::realtime::record_donation))
        .route("/api/realtime/request", post(routes::realtime::record_request))
        .route(
            "/api/realtime/inventory/{hospital_id}",
            get(routes::realtime::inventory),
        )
        .route("/api/realtime/dashboard", get(routes::realtime::dashboard))
        .route("/api/analytics/blood-demand", get(routes::analytics::blood_demand))
        .route("/api/analytics/predict", post(routes::analytics::predict))
        .route("/api/analytics/train-model", post(routes::analytics::train_model))
        .route("/api/analytics/model-stats", get(routes::analytics::model_stats))
        .route("/predict", post(routes::predict::proxy))
        .with_state(state)
}

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let config = Config::load();
    let state = AppState::new(config).await?;

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_origin(Any)
        .max_age(Duration::from_secs(60 * 60));

    let app = build_router(state.clone()).layer(cors);

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
