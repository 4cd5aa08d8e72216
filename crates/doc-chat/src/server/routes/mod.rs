//! API routes for the chat server

pub mod chat;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

use crate::server::state::AppState;

/// Routes mounted under `/api`
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat::chat))
        .route("/info", get(info))
}

/// GET /api/info
async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = state.engine().status();
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Conversational question answering over a PDF corpus",
        "index": status,
        "endpoints": {
            "POST /api/chat": "Ask a question ({message, session_id?})",
            "GET /api/info": "Service and index status",
            "GET /health": "Liveness check",
            "GET /ready": "Readiness check (503 until an index is loaded)",
        }
    }))
}
