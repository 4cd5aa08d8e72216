//! Per-session conversation memory

mod conversation;

pub use conversation::{Conversation, ConversationStore, SessionHandle};
