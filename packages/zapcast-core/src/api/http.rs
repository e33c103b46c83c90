//! HTTP route handlers for the rendezvous server.
//!
//! All handlers are thin - they delegate to the party registry and shape
//! its answers into the rendezvous JSON wire.

use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::api::registry::MessageOutcome;
use crate::api::response::{api_error, api_ok, api_success};
use crate::api::AppState;
use crate::party::PlaybackUpdate;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateParams {
    username: Option<String>,
}

#[derive(Deserialize)]
struct JoinParams {
    code: Option<String>,
    username: Option<String>,
}

#[derive(Deserialize)]
struct CodeParams {
    code: Option<String>,
}

#[derive(Deserialize)]
struct MessagesParams {
    code: Option<String>,
    #[serde(default)]
    since: f64,
}

#[derive(Deserialize)]
struct UpdateRequest {
    code: Option<String>,
    #[serde(flatten)]
    update: PlaybackUpdate,
}

#[derive(Deserialize)]
struct SendMessageRequest {
    code: Option<String>,
    username: Option<String>,
    text: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/party/create", get(create_party))
        .route("/party/join", get(join_party))
        .route("/party/state", get(party_state))
        .route("/party/messages", get(party_messages))
        .route("/party/leave", get(leave_party))
        .route("/party/update", post(update_party))
        .route("/party/send-message", post(send_message))
        .with_state(state)
}

/// Permissive CORS so browser-hosted players on any origin can reach the
/// rendezvous endpoints, preflight included.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "service": "zapcast-rendezvous",
        "parties": state.registry.party_count()
    }))
}

async fn create_party(
    State(state): State<AppState>,
    Query(params): Query<CreateParams>,
) -> impl IntoResponse {
    let code = state.registry.create(params.username.as_deref().unwrap_or(""));
    // The created code rides under snake_case `party_code`; the rest of
    // the wire is camelCase.
    api_success(json!({ "success": true, "party_code": code }))
}

async fn join_party(State(state): State<AppState>, Query(params): Query<JoinParams>) -> Response {
    let code = normalized_code(params.code);
    match state
        .registry
        .join(&code, params.username.as_deref().unwrap_or(""))
    {
        Some(view) => api_success(json!({
            "success": true,
            "channel": view.channel,
            "playing": view.playing,
            "currentTime": view.current_time,
            "members": view.members,
        }))
        .into_response(),
        None => party_not_found(),
    }
}

async fn party_state(State(state): State<AppState>, Query(params): Query<CodeParams>) -> Response {
    let code = normalized_code(params.code);
    match state.registry.state(&code) {
        Some(view) => api_success(json!({
            "success": true,
            "host": view.host,
            "members": view.members,
            "channel": view.channel,
            "playing": view.playing,
            "currentTime": view.current_time,
        }))
        .into_response(),
        None => party_not_found(),
    }
}

async fn party_messages(
    State(state): State<AppState>,
    Query(params): Query<MessagesParams>,
) -> Response {
    let code = normalized_code(params.code);
    match state.registry.messages_since(&code, params.since) {
        Some(messages) => {
            api_success(json!({ "success": true, "messages": messages })).into_response()
        }
        None => party_not_found(),
    }
}

/// Always succeeds; leaving an unknown or expired party is not an error.
async fn leave_party(
    State(state): State<AppState>,
    Query(params): Query<CodeParams>,
) -> impl IntoResponse {
    state.registry.leave(&normalized_code(params.code));
    api_ok()
}

async fn update_party(
    State(state): State<AppState>,
    Json(request): Json<UpdateRequest>,
) -> Response {
    let code = normalized_code(request.code);
    match state.registry.update(&code, &request.update) {
        Some(()) => api_ok().into_response(),
        None => party_not_found(),
    }
}

async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> Response {
    let code = normalized_code(request.code);
    let username = request.username.as_deref().unwrap_or("");
    let text = request.text.as_deref().unwrap_or("");
    match state.registry.append_message(&code, username, text) {
        MessageOutcome::Stored => api_ok().into_response(),
        MessageOutcome::EmptyText => {
            api_error(StatusCode::BAD_REQUEST, "Empty message").into_response()
        }
        MessageOutcome::PartyNotFound => party_not_found(),
    }
}

fn party_not_found() -> Response {
    api_error(StatusCode::NOT_FOUND, "Party not found").into_response()
}

/// Codes are case-insensitive on the way in, upper-case everywhere else.
fn normalized_code(code: Option<String>) -> String {
    code.unwrap_or_default().to_ascii_uppercase()
}
