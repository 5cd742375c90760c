use super::state::AppState;
use crate::channel::Attachment;
use crate::session::{SessionState, SessionStatus};
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
pub struct StartResponse {
    pub state: SessionState,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub state: SessionState,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AttachmentResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /live/start
/// Start the live session
pub async fn start_session(State(state): State<AppState>) -> impl IntoResponse {
    info!("Start requested");

    match state.live.start().await {
        Ok(()) => (
            StatusCode::OK,
            Json(StartResponse {
                state: state.live.state(),
                message: "Live session starting".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to start live session: {}", e);
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
/// Stop the live session (no-op when already disconnected)
pub async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    info!("Stop requested");

    state.live.stop().await;

    (
        StatusCode::OK,
        Json(StopResponse {
            state: state.live.state(),
            message: "Live session stopped".to_string(),
        }),
    )
}

/// GET /live/status
/// Point-in-time session status (state, volume, counters, last error)
pub async fn get_status(State(state): State<AppState>) -> Json<SessionStatus> {
    Json(state.live.status().await)
}

/// GET /live/transcript
/// Finalized transcript accumulated so far
pub async fn get_transcript(State(state): State<AppState>) -> Json<Vec<TranscriptEntry>> {
    Json(state.live.transcript().await)
}

/// POST /live/attachment
/// Forward an asset to the endpoint; best-effort, dropped when not connected
pub async fn send_attachment(
    State(state): State<AppState>,
    Json(attachment): Json<Attachment>,
) -> impl IntoResponse {
    state.live.send_attachment(attachment).await;

    (
        StatusCode::ACCEPTED,
        Json(AttachmentResponse {
            status: "accepted".to_string(),
        }),
    )
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
