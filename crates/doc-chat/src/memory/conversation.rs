//! Conversation histories keyed by session
//!
//! Each session owns its own turn sequence behind its own async mutex. A
//! query holds that mutex from validation until its turn is recorded, so the
//! turns of one session never interleave while other sessions run freely.
//!
//! Sessions live for the life of the process and are never evicted. Ids come
//! from clients, so the HTTP layer caps their length at
//! [`SessionId::MAX_LEN`](crate::types::SessionId::MAX_LEN).

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::types::{ConversationTurn, SessionId};

/// Shared handle to one session's conversation
pub type SessionHandle = Arc<Mutex<Conversation>>;

/// Append-only sequence of turns for one session
#[derive(Debug, Default, Clone)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed turn
    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// Turns in the order they happened
    pub fn history(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// All conversations of the process
#[derive(Debug, Default)]
pub struct ConversationStore {
    sessions: DashMap<SessionId, SessionHandle>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the session's conversation, creating an empty one on first use
    pub fn session(&self, id: &SessionId) -> SessionHandle {
        if let Some(existing) = self.sessions.get(id) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.sessions
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(Conversation::new())))
                .value(),
        )
    }

    /// Snapshot of a session's history (empty for unknown sessions)
    pub async fn history(&self, id: &SessionId) -> Vec<ConversationTurn> {
        let handle = match self.sessions.get(id) {
            Some(entry) => Arc::clone(entry.value()),
            None => return Vec::new(),
        };
        let conversation = handle.lock().await;
        conversation.history().to_vec()
    }

    /// Number of sessions seen so far
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
