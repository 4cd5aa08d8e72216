//! doc-chat: conversational question answering over a PDF corpus
//!
//! PDFs in a corpus directory are parsed page by page, chunked, embedded and
//! stored in a persisted vector index. Questions are answered by retrieving
//! the closest chunks and asking a generative model, with per-session
//! conversation history and deduplicated source file names.

pub mod config;
pub mod error;
pub mod index;
pub mod ingestion;
pub mod memory;
pub mod providers;
pub mod rag;
pub mod server;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ChatConfig;
pub use error::{Error, Result};
pub use rag::{ChatEngine, FALLBACK_ANSWER};
pub use types::{ChatRequest, ChatResponse, Chunk, ConversationTurn, Document, SessionId};
