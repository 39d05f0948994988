//! TOML configuration loading and validation.
//!
//! Everything the binary needs is read from one file (default
//! `./config/philo.toml`). [`load_config`] parses it and rejects invalid
//! values up front, so the rest of the program can trust the numbers it
//! receives. Secrets such as `OPENAI_API_KEY` come from the environment.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use philosophy_rag_core::chunk::ChunkConfig;
use philosophy_rag_core::compose::DEFAULT_LEAD_PHRASES;
use philosophy_rag_core::index::Metric;
use philosophy_rag_core::models::{ResponseMode, School};
use philosophy_rag_core::prompt::PromptTemplates;
use philosophy_rag_core::retrieve::ConfidenceStrategy;
use philosophy_rag_core::schools::SchoolRegistry;

pub const DEFAULT_PERSONA: &str = "Bạn là một triết gia uyên bác chuyên về trường phái {school} ({description}), \
sử dụng phương pháp Socrates để dẫn dắt người học tự suy nghĩ.";

pub const DEFAULT_REFUSAL: &str = "Xin lỗi, câu hỏi này nằm ngoài phạm vi kiến thức {school} của tôi. \
Tôi chỉ có thể thảo luận về các chủ đề liên quan đến {description}.";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub prompt: PromptTemplates,
    #[serde(default)]
    pub socratic: SocraticConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub schools: Vec<SchoolConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared by consecutive windows.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub metric: Metric,
    #[serde(default)]
    pub confidence: ConfidenceStrategy,
    /// Scope threshold for schools that do not set their own.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Off-topic terms applied to every school in addition to its own.
    #[serde(default = "default_off_topic_terms")]
    pub off_topic_terms: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            metric: Metric::default(),
            confidence: ConfidenceStrategy::default(),
            threshold: default_threshold(),
            off_topic_terms: default_off_topic_terms(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_threshold() -> f32 {
    0.3
}
fn default_off_topic_terms() -> Vec<String> {
    [
        "khoa học máy tính",
        "lập trình",
        "công nghệ",
        "y học",
        "vật lý",
        "hóa học",
        "toán học thuần túy",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `disabled`, `hashing`, `openai`, `ollama` or `local`.
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `disabled`, `extractive`, `openai` or `ollama`.
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_temperature() -> f32 {
    0.6
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct SocraticConfig {
    #[serde(default = "default_lead_phrases")]
    pub lead_phrases: Vec<String>,
}

impl Default for SocraticConfig {
    fn default() -> Self {
        Self {
            lead_phrases: default_lead_phrases(),
        }
    }
}

fn default_lead_phrases() -> Vec<String> {
    DEFAULT_LEAD_PHRASES.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EvaluationConfig {
    /// Maximum scenarios in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub mode: ResponseMode,
    /// Questions every school should refuse, used by the built-in scenario set.
    #[serde(default = "default_out_of_scope_questions")]
    pub out_of_scope_questions: Vec<String>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            mode: ResponseMode::default(),
            out_of_scope_questions: default_out_of_scope_questions(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_out_of_scope_questions() -> Vec<String> {
    [
        "Làm sao để lập trình Python?",
        "Công thức hóa học của nước là gì?",
        "Ai là tổng thống Mỹ hiện tại?",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchoolConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub persona: Option<String>,
    pub data_dir: PathBuf,
    /// Overrides `retrieval.threshold` for this school.
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default)]
    pub refusal: Option<String>,
    #[serde(default)]
    pub reflection_questions: Vec<String>,
    #[serde(default)]
    pub off_topic_terms: Vec<String>,
    /// In-scope questions for the built-in evaluation scenarios.
    #[serde(default)]
    pub evaluation_questions: Vec<String>,
}

impl Config {
    /// Validated chunking parameters.
    pub fn chunk_config(&self) -> Result<ChunkConfig> {
        Ok(ChunkConfig::new(self.chunking.chunk_size, self.chunking.overlap)?)
    }

    /// Resolve every `[[schools]]` entry against the global defaults.
    pub fn resolved_schools(&self) -> Vec<School> {
        self.schools
            .iter()
            .map(|s| {
                let mut off_topic = self.retrieval.off_topic_terms.clone();
                off_topic.extend(s.off_topic_terms.iter().cloned());
                School {
                    id: s.id.clone(),
                    name: s.name.clone(),
                    description: s.description.clone(),
                    persona: s.persona.clone().unwrap_or_else(|| DEFAULT_PERSONA.to_string()),
                    data_dir: s.data_dir.clone(),
                    threshold: s.threshold.unwrap_or(self.retrieval.threshold),
                    refusal: s.refusal.clone().unwrap_or_else(|| DEFAULT_REFUSAL.to_string()),
                    reflection_questions: s.reflection_questions.clone(),
                    off_topic_terms: off_topic,
                }
            })
            .collect()
    }

    /// Lookup table of the configured schools.
    pub fn school_registry(&self) -> Result<SchoolRegistry> {
        Ok(SchoolRegistry::new(self.resolved_schools())?)
    }

    pub fn school_config(&self, id: &str) -> Option<&SchoolConfig> {
        self.schools.iter().find(|s| s.id == id)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    config.chunk_config()?;

    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    if let ConfidenceStrategy::MeanTop(0) = config.retrieval.confidence {
        bail!("retrieval.confidence.mean_top must be >= 1");
    }
    validate_threshold("retrieval.threshold", config.retrieval.threshold, config.retrieval.metric)?;

    if config.evaluation.concurrency == 0 {
        bail!("evaluation.concurrency must be >= 1");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "hashing" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hashing, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be >= 1");
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "disabled" | "extractive" => {}
        "openai" | "ollama" => {
            if config.generation.model.is_none() {
                bail!(
                    "generation.model must be specified when provider is '{}'",
                    config.generation.provider
                );
            }
        }
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled, extractive, openai, or ollama.",
            other
        ),
    }

    for school in &config.schools {
        if let Some(t) = school.threshold {
            validate_threshold(&format!("schools.{}.threshold", school.id), t, config.retrieval.metric)?;
        }
    }
    config.school_registry()?;

    Ok(config)
}

fn validate_threshold(key: &str, value: f32, metric: Metric) -> Result<()> {
    let ok = match metric {
        Metric::Cosine => (-1.0..=1.0).contains(&value),
        Metric::L2 => value > 0.0 && value <= 1.0,
    };
    if !ok {
        let range = match metric {
            Metric::Cosine => "[-1.0, 1.0]",
            Metric::L2 => "(0.0, 1.0]",
        };
        bail!("{} must be in {} for metric '{}'", key, range, metric.as_str());
    }
    Ok(())
}
