//! HTTP control API for the demo UI
//!
//! This module provides a REST API around the call manager:
//! - POST /api/calls - Create a call at the provider (credential proxy)
//! - POST /calls/start - Start a call for a caller
//! - POST /calls/end - End the current call
//! - POST /calls/mute/:party - Toggle mute for `user` or `agent`
//! - GET /calls/current - Call state and live board
//! - GET /callers/:caller_id/balance - Remaining seconds
//! - GET /callers/:caller_id/calls - Call history
//! - GET /health - Health check

mod board;
mod handlers;
mod routes;
mod state;

pub use board::{LiveCall, LiveCallBoard};
pub use routes::create_router;
pub use state::AppState;
