//! Ollama chat client.
//!
//! Sends non-streaming `/api/chat` requests. Image prompts go to a separate
//! vision model with the image attached to the user message.

use super::LanguageModel;
use crate::error::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Connection settings for the Ollama client.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub ollama_url: String,
    pub model_name: String,
    pub vision_model_name: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model_name: "llama3.2:latest".to_string(),
            vision_model_name: "llava:latest".to_string(),
            temperature: 0.0,
            timeout_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Language model backed by an Ollama server.
pub struct OllamaClient {
    config: OllamaConfig,
    http_client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self, ModelError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ModelError::Request(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    async fn chat(&self, model: &str, message: ChatMessage) -> Result<String, ModelError> {
        let url = format!("{}/api/chat", self.config.ollama_url.trim_end_matches('/'));

        let request = OllamaChatRequest {
            model,
            messages: vec![message],
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };

        debug!("Sending chat request to {} ({})", url, model);

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout(self.config.timeout_seconds)
                } else if e.is_connect() {
                    ModelError::Connect(self.config.ollama_url.clone())
                } else {
                    ModelError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api { status, body });
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Decode(e.to_string()))?;

        Ok(chat_response.message.content)
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let message = ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
            images: Vec::new(),
        };
        self.chat(&self.config.model_name, message).await
    }

    async fn generate_with_image(
        &self,
        prompt: &str,
        image_base64: &str,
    ) -> Result<String, ModelError> {
        let message = ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
            images: vec![image_base64.to_string()],
        };
        self.chat(&self.config.vision_model_name, message).await
    }
}
