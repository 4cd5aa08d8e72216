//! Core types for documents, chunks and chat exchanges

pub mod chat;
pub mod document;

pub use chat::{ChatRequest, ChatResponse, ConversationTurn, SessionId};
pub use document::{Chunk, Document, Page};
