use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::OllamaConfig;
use crate::error::{OllamaError, ServiceError, ServiceResult};

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    config: OllamaConfig,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: OllamaConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::Ollama(OllamaError::Connection {
                    url: config.base_url.clone(),
                    source: e,
                })
            })?;

        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);

        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "Ollama health check failed");
                false
            }
        }
    }

    /// Generate a non-streaming chat reply with the configured model
    pub async fn chat(&self, messages: Vec<ChatMessage>) -> ServiceResult<String> {
        let url = format!("{}/api/chat", self.config.base_url);
        let model = &self.config.model;

        let request = OllamaChatRequest {
            model: model.clone(),
            messages,
            stream: false,
            options: Some(OllamaOptions {
                temperature: Some(self.config.temperature),
            }),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| OllamaError::Connection {
                url: url.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            return Err(error_from_response(response, model).await);
        }

        let chat_response: OllamaChatResponse =
            response
                .json()
                .await
                .map_err(|e| OllamaError::InvalidResponse {
                    message: e.to_string(),
                })?;

        debug!(model = %model, chars = chat_response.message.content.len(), "Chat reply received");
        Ok(chat_response.message.content)
    }

    /// Embed `text` with `model`
    pub async fn embed(&self, model: &str, text: &str) -> ServiceResult<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.config.base_url);

        let request = OllamaEmbeddingRequest {
            model: model.to_string(),
            prompt: text.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| OllamaError::Connection {
                url: url.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            return Err(error_from_response(response, model).await);
        }

        let embedding_response: OllamaEmbeddingResponse =
            response
                .json()
                .await
                .map_err(|e| OllamaError::InvalidResponse {
                    message: e.to_string(),
                })?;

        if embedding_response.embedding.is_empty() {
            return Err(OllamaError::InvalidResponse {
                message: "empty embedding".to_string(),
            }
            .into());
        }

        Ok(embedding_response.embedding)
    }
}

async fn error_from_response(response: reqwest::Response, model: &str) -> ServiceError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();

    if message.contains("model")
        && (message.contains("not found") || message.contains("does not exist"))
    {
        return ServiceError::Ollama(OllamaError::ModelNotFound {
            model: model.to_string(),
        });
    }

    ServiceError::Ollama(OllamaError::Generation { status, message })
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

// Internal Ollama API types

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}
