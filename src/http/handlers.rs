use super::board::LiveCall;
use super::state::AppState;
use crate::call::{CallOutcome, CallRecord, CallSnapshot};
use crate::error::CallError;
use crate::provider::ErrorBody;
use crate::transport::Party;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

const MINUTES_USED_UP_MESSAGE: &str =
    "Your minutes have been used up. Thank you for talking with Alex!";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartCallRequest {
    pub caller_id: String,

    /// Optional model override (e.g. "ultravox-8B")
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartCallResponse {
    pub call_id: Uuid,
    pub join_url: String,
    pub status: String,
    pub max_duration: String,
}

#[derive(Debug, Serialize)]
pub struct EndCallResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MuteResponse {
    pub party: Party,
    pub muted: bool,
}

#[derive(Debug, Serialize)]
pub struct CurrentCallResponse {
    pub call: CallSnapshot,
    pub live: LiveCall,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_json(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// Map the error taxonomy onto HTTP statuses
fn call_error_response(err: &CallError) -> Response {
    let status = match err {
        CallError::Config(_) => StatusCode::BAD_REQUEST,
        CallError::Network(_) | CallError::Transport(_) => StatusCode::BAD_GATEWAY,
        CallError::ServerConfig(_) | CallError::Persistence(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_json(status, err.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/calls
/// Create a call at the provider using the server-side credential
pub async fn create_provider_call(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    match state.provider.create_call(&body).await {
        Ok(created) => (StatusCode::OK, Json(created)).into_response(),
        Err(CallError::ServerConfig(e)) => {
            error!("Provider proxy misconfigured: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: "Server configuration error".to_string(),
                    details: None,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Error calling provider API: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: "Error calling provider API".to_string(),
                    details: Some(e.to_string()),
                }),
            )
                .into_response()
        }
    }
}

/// POST /calls/start
/// Start a call limited to the caller's remaining balance
pub async fn start_call(
    State(state): State<AppState>,
    Json(req): Json<StartCallRequest>,
) -> impl IntoResponse {
    info!("Starting call for caller: {}", req.caller_id);

    let balance = match state.usage.ensure_account(&req.caller_id).await {
        Ok(balance) => balance,
        Err(e) => {
            error!("Failed to load wallet for {}: {}", req.caller_id, e);
            return call_error_response(&e);
        }
    };

    if balance.seconds == 0 {
        warn!("Caller {} has no minutes remaining", req.caller_id);
        return error_json(
            StatusCode::PAYMENT_REQUIRED,
            "You have no minutes remaining in your wallet",
        );
    }

    let max_duration = format!("{}s", balance.seconds);
    let config = state
        .agent
        .call_config(req.model.as_deref())
        .with_max_duration(max_duration.clone())
        .with_time_exceeded_message(MINUTES_USED_UP_MESSAGE);

    state.board.reset().await;

    let observer = Arc::clone(&state.board);
    match state
        .manager
        .start_call(config, Some(req.caller_id.clone()), observer)
        .await
    {
        Ok(started) => {
            info!("Call {} started for {}", started.call_id, req.caller_id);
            (
                StatusCode::OK,
                Json(StartCallResponse {
                    call_id: started.call_id,
                    join_url: started.join_url,
                    status: "active".to_string(),
                    max_duration,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to start call: {}", e);
            call_error_response(&e)
        }
    }
}

/// POST /calls/end
/// End the current call (no-op when idle)
pub async fn end_call(State(state): State<AppState>) -> impl IntoResponse {
    match state.manager.end_call(CallOutcome::Completed).await {
        Ok(()) => (
            StatusCode::OK,
            Json(EndCallResponse {
                status: "ended".to_string(),
                message: "Call ended".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to end call: {}", e);
            call_error_response(&e)
        }
    }
}

/// POST /calls/mute/:party
/// Toggle mute for the user's microphone or the agent's speaker
pub async fn toggle_mute(
    State(state): State<AppState>,
    Path(party): Path<String>,
) -> impl IntoResponse {
    let party: Party = match party.parse() {
        Ok(party) => party,
        Err(e) => return error_json(StatusCode::BAD_REQUEST, e),
    };

    match state.manager.toggle_mute(party).await {
        Some(muted) => (StatusCode::OK, Json(MuteResponse { party, muted })).into_response(),
        None => error_json(StatusCode::CONFLICT, "No active session"),
    }
}

/// GET /calls/current
/// Current call state plus the live board
pub async fn current_call(State(state): State<AppState>) -> impl IntoResponse {
    let call = state.manager.snapshot().await;
    let live = state.board.snapshot().await;
    (StatusCode::OK, Json(CurrentCallResponse { call, live }))
}

/// GET /callers/:caller_id/balance
/// Remaining seconds for a caller
pub async fn get_balance(
    State(state): State<AppState>,
    Path(caller_id): Path<String>,
) -> impl IntoResponse {
    match state.usage.balance(&caller_id).await {
        Ok(Some(balance)) => (StatusCode::OK, Json(balance)).into_response(),
        Ok(None) => error_json(
            StatusCode::NOT_FOUND,
            format!("No wallet for caller {}", caller_id),
        ),
        Err(e) => {
            error!("Failed to get balance: {}", e);
            call_error_response(&e)
        }
    }
}

/// GET /callers/:caller_id/calls
/// Call history, newest first, without provider-disconnected calls
pub async fn get_call_history(
    State(state): State<AppState>,
    Path(caller_id): Path<String>,
) -> impl IntoResponse {
    match state.usage.history(&caller_id).await {
        Ok(records) => {
            let visible: Vec<CallRecord> = records
                .into_iter()
                .filter(|r| r.outcome != CallOutcome::Disconnected)
                .collect();
            (StatusCode::OK, Json(visible)).into_response()
        }
        Err(e) => {
            error!("Failed to load call history: {}", e);
            call_error_response(&e)
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
