//! Generation provider implementations.
//!
//! | Config value | Provider |
//! |--------------|----------|
//! | `"disabled"` | [`DisabledGenerator`] |
//! | `"extractive"` | [`ExtractiveGenerator`] (offline, quotes evidence) |
//! | `"openai"` | [`OpenAIGenerator`] (`POST /v1/chat/completions`) |
//! | `"ollama"` | [`OllamaGenerator`] (`POST /api/chat`) |
//!
//! Each call makes one HTTP request bounded by `generation.timeout_secs`.
//! A timeout becomes [`RagError::GeneratorTimeout`]; connection failures,
//! non-2xx statuses and unreadable bodies become
//! [`RagError::GeneratorUnavailable`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use philosophy_rag_core::generate::{ExtractiveGenerator, Generator};
use philosophy_rag_core::error::{RagError, Result as RagResult};
use philosophy_rag_core::prompt::PromptSpec;

use crate::config::{Config, GenerationConfig};

const OPENAI_URL: &str = "https://api.openai.com/v1";
const OLLAMA_URL: &str = "http://localhost:11434";

/// Used when `generation.provider = "disabled"`; every turn that reaches
/// generation fails as unavailable.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &PromptSpec) -> RagResult<String> {
        Err(RagError::GeneratorUnavailable(
            "generation provider is disabled; set [generation].provider in the config".into(),
        ))
    }
}

struct HttpSettings {
    model: String,
    url: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpSettings {
    fn new(config: &GenerationConfig, default_url: &str, service: &str) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for {} provider", service))?;
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| default_url.to_string())
                .trim_end_matches('/')
                .to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout,
            client,
        })
    }

    async fn post(
        &self,
        service: &str,
        request: reqwest::RequestBuilder,
        body: &serde_json::Value,
    ) -> RagResult<serde_json::Value> {
        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify(service, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::GeneratorUnavailable(format!(
                "{} API error {}: {}",
                service, status, text
            )));
        }
        response.json().await.map_err(|e| self.classify(service, e))
    }

    fn classify(&self, service: &str, e: reqwest::Error) -> RagError {
        if e.is_timeout() {
            RagError::GeneratorTimeout { after: self.timeout }
        } else {
            RagError::GeneratorUnavailable(format!("{} request failed ({}): {}", service, self.url, e))
        }
    }
}

fn chat_messages(prompt: &PromptSpec) -> serde_json::Value {
    serde_json::to_value(prompt.messages()).unwrap_or_else(|_| serde_json::json!([]))
}

// ============ OpenAI ============

/// Chat completions via the OpenAI API. Requires `OPENAI_API_KEY`.
pub struct OpenAIGenerator {
    settings: HttpSettings,
    api_key: String,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            settings: HttpSettings::new(config, OPENAI_URL, "OpenAI")?,
            api_key,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn name(&self) -> &str {
        &self.settings.model
    }

    async fn generate(&self, prompt: &PromptSpec) -> RagResult<String> {
        let s = &self.settings;
        let body = serde_json::json!({
            "model": s.model,
            "messages": chat_messages(prompt),
            "temperature": s.temperature,
            "max_tokens": s.max_tokens,
        });
        let request = s
            .client
            .post(format!("{}/chat/completions", s.url))
            .bearer_auth(&self.api_key);
        let json = s.post("OpenAI", request, &body).await?;
        parse_openai_reply(&json)
    }
}

fn parse_openai_reply(json: &serde_json::Value) -> RagResult<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.to_string())
        .ok_or_else(|| {
            RagError::GeneratorUnavailable("invalid OpenAI response: missing choices[0].message.content".into())
        })
}

// ============ Ollama ============

/// Chat against a local Ollama instance, non-streaming.
pub struct OllamaGenerator {
    settings: HttpSettings,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            settings: HttpSettings::new(config, OLLAMA_URL, "Ollama")?,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        &self.settings.model
    }

    async fn generate(&self, prompt: &PromptSpec) -> RagResult<String> {
        let s = &self.settings;
        let body = serde_json::json!({
            "model": s.model,
            "messages": chat_messages(prompt),
            "stream": false,
            "options": {
                "temperature": s.temperature,
                "num_predict": s.max_tokens,
            },
        });
        let request = s.client.post(format!("{}/api/chat", s.url));
        let json = s.post("Ollama", request, &body).await?;
        parse_ollama_reply(&json)
    }
}

fn parse_ollama_reply(json: &serde_json::Value) -> RagResult<String> {
    json.pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.to_string())
        .ok_or_else(|| RagError::GeneratorUnavailable("invalid Ollama response: missing message.content".into()))
}

/// Instantiate the generator named by `generation.provider`.
///
/// The extractive generator needs the schools' reflection question pools,
/// so this takes the whole config.
pub fn create_generator(config: &Config) -> Result<Arc<dyn Generator>> {
    let generation = &config.generation;
    match generation.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "extractive" => Ok(Arc::new(ExtractiveGenerator::new(
            config.resolved_schools().iter(),
        ))),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(generation)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(generation)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
