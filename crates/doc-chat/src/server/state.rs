//! Shared application state

use std::sync::Arc;

use crate::rag::ChatEngine;

/// State handed to every handler; cheap to clone
#[derive(Clone)]
pub struct AppState {
    engine: Arc<ChatEngine>,
}

impl AppState {
    pub fn new(engine: ChatEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    pub fn engine(&self) -> &ChatEngine {
        &self.engine
    }

    /// Whether a usable index is loaded
    pub fn is_ready(&self) -> bool {
        self.engine.is_ready()
    }
}
