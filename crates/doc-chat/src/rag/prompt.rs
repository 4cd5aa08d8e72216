//! Prompt assembly for grounded, conversational answers

use std::collections::BTreeSet;

use crate::config::PromptConfig;
use crate::types::{Chunk, ConversationTurn};

const CONTEXT_SEPARATOR: &str = "\n\n";
const TURN_SEPARATOR: &str = "\n";

/// Prompt builder for chat queries
pub struct PromptBuilder;

impl PromptBuilder {
    /// Build the full prompt: instructions naming the documents, the retrieved
    /// context, the conversation so far and the new question.
    pub fn build_chat_prompt(
        documents: &[String],
        chunks: &[Chunk],
        history: &[ConversationTurn],
        question: &str,
        budget: &PromptConfig,
    ) -> String {
        let files = if documents.is_empty() {
            "Unknown".to_string()
        } else {
            documents.join(", ")
        };

        let context = Self::build_context(chunks, budget.max_context_chars);
        let history = Self::build_history(history, budget.max_history_chars);

        let mut prompt = format!(
            r#"You are a helpful AI assistant tasked with answering questions based on the provided documents.
You have access to the following documents: {files}.

Use the following pieces of context to answer the question at the end.
If you don't know the answer, just say that you don't know, don't try to make up an answer.
Keep the answer concise and helpful.

Context:
{context}
"#
        );

        if !history.is_empty() {
            prompt.push_str(&format!("\nChat History:\n{}\n", history));
        }

        prompt.push_str(&format!("\nQuestion: {}\n\nHelpful Answer:", question.trim()));
        prompt
    }

    /// Concatenate chunk texts in relevance order within `max_chars`.
    /// The most relevant chunk is always present, cut down if it alone is too long.
    pub fn build_context(chunks: &[Chunk], max_chars: usize) -> String {
        let mut context = String::new();
        let mut used = 0usize;

        for (i, chunk) in chunks.iter().enumerate() {
            let len = chunk.text.chars().count();

            if i == 0 {
                let text = truncate_chars(&chunk.text, max_chars);
                used = text.chars().count();
                context.push_str(text);
                continue;
            }

            let needed = len + CONTEXT_SEPARATOR.len();
            if used + needed > max_chars {
                tracing::debug!(
                    "Context budget reached: kept {} of {} chunks",
                    i,
                    chunks.len()
                );
                break;
            }
            context.push_str(CONTEXT_SEPARATOR);
            context.push_str(&chunk.text);
            used += needed;
        }

        context
    }

    /// Render the newest turns that fit in `max_chars`, oldest first
    pub fn build_history(turns: &[ConversationTurn], max_chars: usize) -> String {
        let mut kept: Vec<String> = Vec::new();
        let mut used = 0usize;

        for turn in turns.iter().rev() {
            let rendered = format!("Human: {}\nAssistant: {}", turn.question, turn.answer);
            let separator = if kept.is_empty() { 0 } else { TURN_SEPARATOR.len() };
            let needed = rendered.chars().count() + separator;
            if used + needed > max_chars {
                if kept.is_empty() {
                    // The newest turn is always kept, with its answer cut to fit
                    let prefix = format!("Human: {}\nAssistant: ", turn.question);
                    let room = max_chars.saturating_sub(prefix.chars().count());
                    let rendered = if room > 0 {
                        format!("{}{}", prefix, truncate_chars(&turn.answer, room))
                    } else {
                        truncate_chars(&prefix, max_chars).to_string()
                    };
                    tracing::debug!(
                        "Newest turn ({} chars) exceeds the history budget, truncated",
                        needed
                    );
                    kept.push(rendered);
                }
                break;
            }
            used += needed;
            kept.push(rendered);
        }

        if kept.len() < turns.len() {
            tracing::debug!(
                "History budget reached: kept {} of {} turns",
                kept.len(),
                turns.len()
            );
        }

        kept.reverse();
        kept.join(TURN_SEPARATOR)
    }
}

/// Basenames of the chunks' sources, deduplicated and sorted
pub fn unique_sources(chunks: &[Chunk]) -> Vec<String> {
    chunks
        .iter()
        .map(Chunk::source_name)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
