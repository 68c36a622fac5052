//! HTTP API server for external control (UI layer)
//!
//! This module provides a REST API for driving the live session:
//! - POST /live/start - Start a conversation
//! - POST /live/stop - Stop the conversation
//! - GET /live/status - Current phase, status text and statistics
//! - GET /live/transcript - Finalized transcript entries
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
