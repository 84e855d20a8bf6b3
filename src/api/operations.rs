use super::{ApiError, AppState};
use crate::control::ControlCommand;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Probe round state
#[derive(Serialize)]
pub struct ProbeStatusResponse {
    pub running: bool,
    pub rounds_completed: u64,
}

/// Control command response
#[derive(Serialize)]
pub struct ControlResponse {
    pub success: bool,
    pub request_id: String,
}

/// Create operator API router
pub fn create_operations_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/probe", post(trigger_probe).get(probe_status))
        .route("/api/control/:id/:command", post(send_control))
        .with_state(state)
}

/// POST /api/probe - Start a probe round in the background
///
/// 202 when a round was started, 409 when one is already running.
async fn trigger_probe(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<ProbeStatusResponse>), ApiError> {
    if state.prober.spawn_round().is_none() {
        return Err(ApiError::Conflict("Probe round already running".to_string()));
    }

    info!("Probe round triggered via API");

    Ok((
        StatusCode::ACCEPTED,
        Json(ProbeStatusResponse {
            running: true,
            rounds_completed: state.prober.rounds_completed(),
        }),
    ))
}

/// GET /api/probe - Whether a round is running
async fn probe_status(State(state): State<Arc<AppState>>) -> Json<ProbeStatusResponse> {
    Json(ProbeStatusResponse {
        running: state.prober.is_running(),
        rounds_completed: state.prober.rounds_completed(),
    })
}

/// POST /api/control/:id/:command - Send shutdown/reboot to a device
async fn send_control(
    State(state): State<Arc<AppState>>,
    Path((id, command)): Path<(String, String)>,
) -> Result<Json<ControlResponse>, ApiError> {
    let command: ControlCommand = command.parse()?;
    let request_id = state.control.send(&id, command).await?;

    Ok(Json(ControlResponse {
        success: true,
        request_id,
    }))
}
