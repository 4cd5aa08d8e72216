//! Chat endpoint

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{ChatRequest, ChatResponse, SessionId};

/// Header carrying the session when the body does not
pub const SESSION_HEADER: &str = "x-session-id";

/// POST /api/chat - answer a question within a conversation
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>> {
    let Json(request) = payload?;
    let session = resolve_session(request.session_id.as_deref(), &headers)?;
    tracing::info!(
        "Chat query in session {} ({} chars)",
        session,
        request.message.chars().count()
    );

    let response = state.engine().chat(&session, &request.message).await?;
    Ok(Json(response))
}

/// Body field first, then header, then the shared default session
fn resolve_session(body: Option<&str>, headers: &HeaderMap) -> Result<SessionId> {
    let header = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok());

    match body.filter(|id| !id.trim().is_empty()).or(header) {
        Some(id) => SessionId::parse(id),
        None => Ok(SessionId::default()),
    }
}
