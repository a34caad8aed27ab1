//! Language-model access.
//!
//! Resolvers and collaborators only see the [`LanguageModel`] trait; the
//! concrete client talks to a local Ollama server.

pub mod ollama;

pub use ollama::{OllamaClient, OllamaConfig};

use crate::error::ModelError;
use async_trait::async_trait;

/// A text-generation model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generates a reply for a plain text prompt.
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;

    /// Generates a reply for a prompt accompanied by one base64-encoded image.
    async fn generate_with_image(
        &self,
        _prompt: &str,
        _image_base64: &str,
    ) -> Result<String, ModelError> {
        Err(ModelError::Unsupported("image input"))
    }
}

/// Strips a surrounding Markdown code fence (```json ... ```) from a reply.
pub fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (e.g. "json") on the opening line.
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest.trim_start_matches("json"),
    };

    body.trim_end().trim_end_matches("```").trim()
}
