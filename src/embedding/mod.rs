//! Embedding provider implementations.
//!
//! Every provider implements the core [`Embedder`] trait, so the retriever
//! and the index builder never see which service sits behind it:
//!
//! | Config value | Provider |
//! |--------------|----------|
//! | `"disabled"` | [`DisabledEmbedder`] (every call fails) |
//! | `"hashing"` | [`HashingEmbedder`] (offline, deterministic) |
//! | `"openai"` | [`OpenAIEmbedder`] (`POST /v1/embeddings`) |
//! | `"ollama"` | [`OllamaEmbedder`] (`POST /api/embed`) |
//! | `"local"` | `LocalEmbedder` (fastembed, behind the `local-embeddings-fastembed` feature) |
//!
//! Every provider that does real work applies `embedding.timeout_secs`:
//! network providers to each request, the local model to each blocking
//! embedding call. Each makes exactly one attempt, and a timeout, a
//! transport failure or a non-2xx status surfaces as
//! [`RagError::EmbeddingService`]. Whether to try the
//! turn again is the caller's decision.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use philosophy_rag_core::embedding::{Embedder, HashingEmbedder};
use philosophy_rag_core::error::{RagError, Result as RagResult};

use crate::config::EmbeddingConfig;

const DEFAULT_HASHING_DIMS: usize = 256;
const OPENAI_URL: &str = "https://api.openai.com/v1";
const OLLAMA_URL: &str = "http://localhost:11434";

// ============ Disabled ============

/// Placeholder used when `embedding.provider = "disabled"`.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        Err(RagError::EmbeddingService(
            "embedding provider is disabled; set [embedding].provider in the config".into(),
        ))
    }
}

// ============ OpenAI ============

/// Embeddings via the OpenAI API. Requires `OPENAI_API_KEY`.
pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            model,
            dims,
            url: config.url.clone().unwrap_or_else(|| OPENAI_URL.to_string()),
            api_key,
            client,
            timeout,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let response = self
            .client
            .post(format!("{}/embeddings", self.url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("OpenAI", &self.url, self.timeout, e))?;
        let json = read_json("OpenAI", response, self.timeout).await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> RagResult<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| invalid("OpenAI", "missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| invalid("OpenAI", "missing embedding"))?;
        indexed.push((index, json_to_vec("OpenAI", embedding)?));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embeddings from a local Ollama instance.
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            model,
            dims,
            url: config.url.clone().unwrap_or_else(|| OLLAMA_URL.to_string()),
            client,
            timeout,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let response = self
            .client
            .post(format!("{}/api/embed", self.url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("Ollama", &self.url, self.timeout, e))?;
        let json = read_json("Ollama", response, self.timeout).await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> RagResult<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| invalid("Ollama", "missing embeddings array"))?
        .iter()
        .map(|e| json_to_vec("Ollama", e))
        .collect()
}

// ============ Local (fastembed) ============

/// On-device embeddings via fastembed. The model is downloaded on first
/// use and kept loaded for the life of the provider.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    timeout: Duration,
    model: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "multilingual-e5-small".to_string());
        fastembed_model(&model_name)?;
        let dims = config.dims.unwrap_or(match model_name.as_str() {
            "multilingual-e5-base" | "bge-base-en-v1.5" => 768,
            "multilingual-e5-large" | "bge-large-en-v1.5" => 1024,
            _ => 384,
        });
        Ok(Self {
            model_name,
            dims,
            timeout: Duration::from_secs(config.timeout_secs),
            model: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        let slot = Arc::clone(&self.model);
        let name = self.model_name.clone();
        let texts = texts.to_vec();

        run_blocking(self.timeout, move || {
            let mut guard = slot
                .lock()
                .map_err(|_| RagError::EmbeddingService("local model lock poisoned".into()))?;
            if guard.is_none() {
                let kind = fastembed_model(&name).map_err(|e| RagError::EmbeddingService(e.to_string()))?;
                let model = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(kind).with_show_download_progress(true),
                )
                .map_err(|e| {
                    RagError::EmbeddingService(format!("failed to initialize local model: {}", e))
                })?;
                *guard = Some(model);
            }
            match guard.as_mut() {
                Some(model) => model
                    .embed(texts, None)
                    .map_err(|e| RagError::EmbeddingService(format!("local embedding failed: {}", e))),
                None => Err(RagError::EmbeddingService("local model not loaded".into())),
            }
        })
        .await
    }
}

// ============ Shared helpers ============

/// Run blocking model work off the async runtime, giving up after `timeout`.
/// The blocking thread itself cannot be cancelled and finishes in the background.
#[cfg_attr(not(feature = "local-embeddings-fastembed"), allow(dead_code))]
async fn run_blocking<T, F>(timeout: Duration, work: F) -> RagResult<T>
where
    F: FnOnce() -> RagResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(work)).await {
        Ok(joined) => joined
            .map_err(|e| RagError::EmbeddingService(format!("local embedding task failed: {}", e)))?,
        Err(_) => Err(RagError::EmbeddingService(format!(
            "local embedding timed out after {}s",
            timeout.as_secs_f32()
        ))),
    }
}

fn transport_error(service: &str, url: &str, timeout: Duration, e: reqwest::Error) -> RagError {
    if e.is_timeout() {
        RagError::EmbeddingService(format!(
            "{} request timed out after {}s",
            service,
            timeout.as_secs()
        ))
    } else {
        RagError::EmbeddingService(format!(
            "{} connection error (is it reachable at {}?): {}",
            service, url, e
        ))
    }
}

async fn read_json(
    service: &str,
    response: reqwest::Response,
    timeout: Duration,
) -> RagResult<serde_json::Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RagError::EmbeddingService(format!(
            "{} API error {}: {}",
            service, status, body
        )));
    }
    response.json().await.map_err(|e| {
        if e.is_timeout() {
            RagError::EmbeddingService(format!(
                "{} response timed out after {}s",
                service,
                timeout.as_secs()
            ))
        } else {
            invalid(service, &e.to_string())
        }
    })
}

fn json_to_vec(service: &str, value: &serde_json::Value) -> RagResult<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| invalid(service, "embedding is not an array"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| invalid(service, "embedding contains a non-number"))
        })
        .collect()
}

fn invalid(service: &str, what: &str) -> RagError {
    RagError::EmbeddingService(format!("invalid {} response: {}", service, what))
}

/// Instantiate the embedder named by `embedding.provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "hashing" => Ok(Arc::new(HashingEmbedder::new(
            config.dims.unwrap_or(DEFAULT_HASHING_DIMS),
        ))),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
