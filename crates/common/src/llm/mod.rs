//! LLM service clients
//!
//! Concept extraction (structured chat output) and embedding generation
//! against an Ollama-compatible inference service, behind traits so the
//! pipeline can run with mock implementations in tests.

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Ask the inference service to release the model's resident memory.
    /// Best effort; callers log and ignore failures.
    async fn release(&self) -> Result<()> {
        Ok(())
    }

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// Trait for concept extraction from a single text chunk
#[async_trait]
pub trait ConceptExtractor: Send + Sync {
    /// Return the concepts the chunk expresses, possibly empty
    async fn extract(&self, chunk: &str) -> Result<Vec<String>>;

    /// Release the chat model's resident memory. Best effort.
    async fn release(&self) -> Result<()> {
        Ok(())
    }
}

/// Structured output contract for concept extraction
#[derive(Debug, Deserialize)]
struct ExtractedConcepts {
    concepts: Vec<String>,
}

/// JSON schema the chat model is constrained to
fn concepts_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "concepts": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": ["concepts"]
    })
}

fn concept_prompt(chunk: &str) -> String {
    format!(
        "Identify the key concepts expressed in the following text. \
         Return short concept names only, no explanations.\n\nText:\n{}",
        chunk
    )
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    format: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Serialize)]
struct ReleaseRequest<'a> {
    model: &'a str,
    keep_alive: u32,
}

/// Ollama-compatible client for both chat-based concept extraction
/// and embedding generation
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    chat_model: String,
    embedding_model: String,
    dimension: usize,
    max_retries: u32,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            dimension: config.dimension,
            max_retries: config.max_retries,
        })
    }

    async fn embed_request(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embed", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.embedding_model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| AppError::EmbeddingError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EmbeddingError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: EmbedResponse =
            response.json().await.map_err(|e| AppError::EmbeddingError {
                message: format!("Failed to parse response: {}", e),
            })?;

        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::EmbeddingError {
                message: "Empty embeddings response".to_string(),
            })
    }

    async fn chat_request(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&ChatRequest {
                model: &self.chat_model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: prompt,
                }],
                stream: false,
                format: concepts_schema(),
            })
            .send()
            .await
            .map_err(|e| AppError::ConceptExtractionError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ConceptExtractionError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| AppError::ConceptExtractionError {
                    message: format!("Failed to parse response: {}", e),
                })?;

        Ok(result.message.content)
    }

    async fn release_model(&self, model: &str) -> Result<()> {
        let url = format!("{}/api/generate", self.base_url);

        self.client
            .post(&url)
            .json(&ReleaseRequest {
                model,
                keep_alive: 0,
            })
            .send()
            .await?
            .error_for_status()?;

        debug!(model, "Model memory released");
        Ok(())
    }

    /// Embed with bounded retry and exponential backoff
    async fn embed_with_retry(&self, text: &str) -> Result<Vec<f32>> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(100 * 2u64.pow(attempt));
                tokio::time::sleep(delay).await;
            }

            match self.embed_request(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Embedding request failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::Internal {
            message: "Unknown error after retries".to_string(),
        }))
    }

    /// Chat with bounded retry and exponential backoff
    async fn chat_with_retry(&self, prompt: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(100 * 2u64.pow(attempt));
                tokio::time::sleep(delay).await;
            }

            match self.chat_request(prompt).await {
                Ok(content) => return Ok(content),
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Concept extraction request failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::Internal {
            message: "Unknown error after retries".to_string(),
        }))
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_retry(text).await
    }

    async fn release(&self) -> Result<()> {
        self.release_model(&self.embedding_model).await
    }

    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[async_trait]
impl ConceptExtractor for OllamaClient {
    async fn extract(&self, chunk: &str) -> Result<Vec<String>> {
        let prompt = concept_prompt(chunk);
        let content = self.chat_with_retry(&prompt).await?;

        let parsed: ExtractedConcepts =
            serde_json::from_str(&content).map_err(|e| AppError::ConceptExtractionError {
                message: format!("Malformed structured output: {}", e),
            })?;

        Ok(parsed.concepts)
    }

    async fn release(&self) -> Result<()> {
        self.release_model(&self.chat_model).await
    }
}

/// Mock embedder for testing
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        Ok((0..self.dimension).map(|_| rng.gen::<f32>()).collect())
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
