//! Axum handlers for the speech session endpoints.
//!
//! Handlers are thin wrappers — each calls exactly one coordinator
//! operation and returns the result as JSON. Request/response shapes are
//! co-located here to keep the handler surface self-contained.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use speakd_core::{SessionState, StatusSnapshot};

use crate::error::HttpError;
use crate::state::AppState;

// ── Request/response shapes ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub text_segments: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub status: &'static str,
    pub session_id: u64,
    pub state: SessionState,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResponse {
    pub status: &'static str,
    /// Always `idle` — the slot is empty once stop returns.
    pub state: SessionState,
    /// Id of the stopped session, absent when stop was a no-op.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub state: SessionState,
    pub session_id: Option<u64>,
    pub stop_requested: bool,
    pub has_player: bool,
    pub has_worker: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_cause: Option<String>,
}

impl From<StatusSnapshot> for StatusResponse {
    fn from(snapshot: StatusSnapshot) -> Self {
        Self {
            state: snapshot.state,
            session_id: snapshot.session_id,
            stop_requested: snapshot.stop_requested,
            has_player: snapshot.has_player,
            has_worker: snapshot.has_worker,
            failure_cause: snapshot.failure_cause,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// `POST /start`
pub async fn start(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<StartResponse>, HttpError> {
    let receipt = state.coordinator.start(req.text_segments).await?;
    Ok(Json(StartResponse {
        status: "started",
        session_id: receipt.session_id,
        state: receipt.state,
    }))
}

/// `POST /stop` — idempotent, never fails.
pub async fn stop(State(state): State<AppState>) -> Json<StopResponse> {
    let receipt = state.coordinator.stop().await;
    Json(StopResponse {
        status: "stopped",
        state: SessionState::Idle,
        session_id: receipt.session_id,
    })
}

/// `GET /status`
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(state.coordinator.status().into())
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy", service: "speakd" })
}
