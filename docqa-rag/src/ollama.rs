//! Ollama embedding and generation backends.
//!
//! This module is only available when the `ollama` feature is enabled.
//!
//! - Embeddings: `POST /api/embed`
//! - Completions: `POST /api/generate` with `stream: false`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::generator::LanguageModel;

/// Default Ollama API endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct OllamaErrorResponse {
    error: String,
}

async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
) -> std::result::Result<R, String> {
    let response =
        client.post(url).json(body).send().await.map_err(|e| format!("failed to send request: {e}"))?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let detail =
            serde_json::from_str::<OllamaErrorResponse>(&text).map(|e| e.error).unwrap_or(text);
        return Err(format!("HTTP {status}: {detail}"));
    }

    response.json().await.map_err(|e| format!("failed to parse response: {e}"))
}

fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// An [`Embedder`] backed by a local Ollama server.
///
/// Ollama does not report a model's dimensionality up front, so it is
/// given at construction and must match the model (e.g. 768 for
/// `nomic-embed-text`).
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::ollama::OllamaEmbedder;
///
/// let embedder = OllamaEmbedder::new("http://127.0.0.1:11434", "nomic-embed-text", 768);
/// ```
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: normalize_base_url(base_url),
            model: model.into(),
            dimensions,
        }
    }

    fn unavailable(&self, message: String) -> RagError {
        RagError::EmbeddingUnavailable { provider: format!("ollama/{}", self.model), message }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| self.unavailable("no embedding returned".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = "Ollama", model = %self.model, batch_size = texts.len(), "embedding batch");

        let url = format!("{}/api/embed", self.base_url);
        let request = EmbedRequest { model: &self.model, input: texts };
        let response: EmbedResponse =
            post_json(&self.client, &url, &request).await.map_err(|message| {
                error!(provider = "Ollama", error = %message, "embedding request failed");
                self.unavailable(message)
            })?;

        if response.embeddings.len() != texts.len() {
            return Err(self.unavailable(format!(
                "returned {} embeddings for {} inputs",
                response.embeddings.len(),
                texts.len()
            )));
        }
        Ok(response.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// A [`LanguageModel`] backed by Ollama's non-streaming generate endpoint.
#[derive(Debug, Clone)]
pub struct OllamaModel {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: Option<f32>,
}

impl OllamaModel {
    pub fn new(base_url: &str, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: normalize_base_url(base_url),
            model: model.into(),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Check if the Ollama server is reachable.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/version", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!(provider = "Ollama", model = %self.model, prompt_len = prompt.len(), "generating");

        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: self.temperature.map(|temperature| GenerateOptions { temperature }),
        };
        let response: GenerateResponse =
            post_json(&self.client, &url, &request).await.map_err(|message| {
                error!(provider = "Ollama", error = %message, "generate request failed");
                RagError::GenerationServiceError { model: self.model.clone(), message }
            })?;
        Ok(response.response)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
