//! Topic extraction over an LLM.
//!
//! Supports Ollama for local inference and OpenAI-compatible APIs.

mod client;
mod config;

use async_trait::async_trait;

pub use client::{LlmClient, LlmError};
pub use config::{LlmConfig, LlmProvider, DEFAULT_TOPICS_PROMPT};

/// Something that can name the main topics of a text.
#[async_trait]
pub trait TopicExtractor: Send + Sync {
    async fn extract_topics(&self, text: &str) -> Result<Vec<String>, LlmError>;
}
