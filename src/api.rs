use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::poller::{CycleReport, Poller, ResetError};

#[derive(Clone)]
pub struct AppState {
    pub poller: Arc<Poller>,
    pub poll_interval: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/health", get(health))
        .route("/poll", post(trigger_poll))
        .route("/reset", post(reset))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct StatusOut {
    service: &'static str,
    version: &'static str,
    airport: String,
    poll_interval_ms: u64,
    seen_count: usize,
    polling: bool,
    last_poll: Option<CycleReport>,
}

async fn status(State(state): State<AppState>) -> Json<StatusOut> {
    let p = &state.poller;
    Json(StatusOut {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        airport: p.settings().airport_code.clone(),
        poll_interval_ms: state.poll_interval.as_millis() as u64,
        seen_count: p.seen_count(),
        polling: p.is_polling(),
        last_poll: p.last_report(),
    })
}

#[derive(Serialize)]
struct HealthOut {
    status: &'static str,
    polling: bool,
}

async fn health(State(state): State<AppState>) -> Json<HealthOut> {
    Json(HealthOut {
        status: "ok",
        polling: state.poller.is_polling(),
    })
}

#[derive(Serialize)]
struct TriggerOut {
    triggered: bool,
    /// A cycle was already running, so this trigger will be dropped.
    already_running: bool,
}

async fn trigger_poll(State(state): State<AppState>) -> impl IntoResponse {
    let already_running = state.poller.is_polling();
    let poller = state.poller.clone();
    tokio::spawn(async move {
        poller.poll().await;
    });
    (
        StatusCode::ACCEPTED,
        Json(TriggerOut {
            triggered: true,
            already_running,
        }),
    )
}

async fn reset(State(state): State<AppState>) -> impl IntoResponse {
    match state.poller.reset().await {
        Ok(cleared) => (
            StatusCode::OK,
            Json(serde_json::json!({ "cleared": cleared })),
        ),
        Err(e @ ResetError::Busy) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
        Err(e @ ResetError::Persist(_)) => {
            tracing::warn!(error = %e, "reset could not persist");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        }
    }
}
