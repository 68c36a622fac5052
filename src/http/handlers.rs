use super::state::AppState;
use crate::session::{SessionPhase, SessionSnapshot, SessionStats};
use crate::transcript::TranscriptEntry;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{error, info};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub session_id: Option<String>,
    pub phase: SessionPhase,
    pub status: String,
    pub error: Option<String>,
    pub stats: SessionStats,
}

impl From<SessionSnapshot> for StatusResponse {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            session_id: snapshot.session_id,
            phase: snapshot.phase,
            status: snapshot.status_text,
            error: snapshot.last_error,
            stats: snapshot.stats,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /live/start
/// Start a conversation (no-op while one is already running)
pub async fn start_session(State(state): State<AppState>) -> impl IntoResponse {
    info!("Start requested");

    match state.live.start().await {
        Ok(snapshot) => (StatusCode::OK, Json(StatusResponse::from(snapshot))).into_response(),
        Err(e) => {
            error!("Failed to start live session: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to start live session: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// POST /live/stop
/// Stop the conversation; safe to call in any phase
pub async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    info!("Stop requested");

    match state.live.stop().await {
        Ok(snapshot) => (StatusCode::OK, Json(StatusResponse::from(snapshot))).into_response(),
        Err(e) => {
            error!("Failed to stop live session: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to stop live session: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// GET /live/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(StatusResponse::from(state.live.snapshot())))
}

/// GET /live/transcript
/// Finalized entries of the current (or last) session
pub async fn get_transcript(State(state): State<AppState>) -> impl IntoResponse {
    let transcript: Vec<TranscriptEntry> = state.live.snapshot().transcript;
    (StatusCode::OK, Json(transcript))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
