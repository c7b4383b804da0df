//! Liveness reporter — one HTTP endpoint, always 200.

use std::time::Instant;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use tokio::sync::watch;

use crate::session::SessionState;

#[derive(Clone)]
struct HealthState {
    service: String,
    started_at: Instant,
    session: watch::Receiver<SessionState>,
}

/// Liveness response body.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: String,
    uptime_secs: u64,
    session: &'static str,
}

/// Build the router for `GET /health`.
///
/// The endpoint never fails: before the supervisor has run, the initial
/// watch value reads as disconnected.
pub fn health_routes(service: String, session: watch::Receiver<SessionState>) -> Router {
    let state = HealthState {
        service,
        started_at: Instant::now(),
        session,
    };
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    let session = if state.session.borrow().is_connected() {
        "connected"
    } else {
        "disconnected"
    };
    Json(HealthResponse {
        status: "ok",
        service: state.service.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        session,
    })
}
