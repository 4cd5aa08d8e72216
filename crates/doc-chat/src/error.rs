//! Error types for the chat service

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for chat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Chat service errors
#[derive(Debug, Error)]
pub enum Error {
    /// The question was empty or whitespace-only
    #[error("Message cannot be empty")]
    EmptyQuery,

    /// The session id sent by the client is unusable
    #[error("Invalid session id: {0}")]
    InvalidSession(String),

    /// The request body was not a valid chat request
    #[error("{message}")]
    InvalidBody { status: StatusCode, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A corpus file could not be turned into text
    #[error("Failed to parse document '{filename}': {message}")]
    DocumentParse { filename: String, message: String },

    /// Embedding provider error
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Generative model error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Vector index load/persist/search error
    #[error("Vector index error: {0}")]
    IndexIo(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a document parse error
    pub fn document_parse(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DocumentParse {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create a vector index error
    pub fn index_io(message: impl Into<String>) -> Self {
        Self::IndexIo(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the caller caused this error (4xx) rather than the service (5xx)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyQuery | Self::InvalidSession(_) | Self::InvalidBody { .. }
        )
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidBody {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Provider and index details stay in the server log
        let (status, detail) = if let Self::InvalidBody { status, message } = self {
            (status, message)
        } else if self.is_client_error() {
            (StatusCode::BAD_REQUEST, self.to_string())
        } else {
            tracing::error!("Request failed: {}", self);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
