//! Chat request/response and conversation turn types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Identifier of one conversation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Session used by callers that do not identify themselves
    pub const DEFAULT: &'static str = "default";

    /// Longest accepted client-supplied id, in bytes
    pub const MAX_LEN: usize = 128;

    /// Create a session ID, falling back to the default session for blank input
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            Self::default()
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Like [`SessionId::new`], but rejects ids longer than [`SessionId::MAX_LEN`]
    pub fn parse(id: &str) -> Result<Self> {
        let trimmed = id.trim();
        if trimmed.len() > Self::MAX_LEN {
            return Err(Error::InvalidSession(format!(
                "{} bytes exceeds the {} byte limit",
                trimmed.len(),
                Self::MAX_LEN
            )));
        }
        Ok(Self::new(trimmed))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One question/answer exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

impl ConversationTurn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// POST /api/chat body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's question
    pub message: String,
    /// Conversation to continue (optional)
    #[serde(default)]
    pub session_id: Option<String>,
}

/// POST /api/chat success body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Generated answer
    pub response: String,
    /// Unique source file names the answer was grounded on
    pub sources: Vec<String>,
}

impl ChatResponse {
    pub fn new(response: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            response: response.into(),
            sources,
        }
    }
}
