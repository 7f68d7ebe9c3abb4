use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Provider proxy
        .route("/api/calls", post(handlers::create_provider_call))
        // Call control
        .route("/calls/start", post(handlers::start_call))
        .route("/calls/end", post(handlers::end_call))
        .route("/calls/mute/:party", post(handlers::toggle_mute))
        .route("/calls/current", get(handlers::current_call))
        // Caller queries
        .route("/callers/:caller_id/balance", get(handlers::get_balance))
        .route("/callers/:caller_id/calls", get(handlers::get_call_history))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
