use crate::session::SessionController;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The one live session this process drives
    pub live: Arc<SessionController>,
}

impl AppState {
    pub fn new(live: Arc<SessionController>) -> Self {
        Self { live }
    }
}
