use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session control
        .route("/live/start", post(handlers::start_session))
        .route("/live/stop", post(handlers::stop_session))
        // Session queries
        .route("/live/status", get(handlers::get_status))
        .route("/live/transcript", get(handlers::get_transcript))
        // Out-of-band assets
        .route("/live/attachment", post(handlers::send_attachment))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
