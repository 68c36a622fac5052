use crate::session::LiveAgentHandle;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Front end to the single live session
    pub live: LiveAgentHandle,
}

impl AppState {
    pub fn new(live: LiveAgentHandle) -> Self {
        Self { live }
    }
}
