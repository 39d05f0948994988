//! Core data models that flow through a dialogue turn.
//!
//! A [`Query`] enters the engine, the retriever produces a
//! [`RetrievalResult`] of [`ScoredChunk`]s, and the composer emits a
//! [`Response`] carrying [`Citation`]s back to the caller.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One philosophical tradition with its persona and knowledge scope.
///
/// Schools are created from configuration at startup and are read-only
/// afterwards; `id` is the lookup key everywhere else.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct School {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Persona instruction template. `{school}` expands to [`School::name`].
    pub persona: String,
    /// Directory holding the raw documents of this school.
    pub data_dir: PathBuf,
    /// Minimum retrieval confidence for a question to count as in scope.
    pub threshold: f32,
    /// Refusal template. `{school}` and `{description}` are expanded.
    pub refusal: String,
    /// Reflection questions used by the extractive generator.
    #[serde(default)]
    pub reflection_questions: Vec<String>,
    /// Terms that mark a question as off-topic regardless of retrieval score.
    #[serde(default)]
    pub off_topic_terms: Vec<String>,
}

impl School {
    pub fn persona_text(&self) -> String {
        self.expand(&self.persona)
    }

    pub fn refusal_text(&self) -> String {
        self.expand(&self.refusal)
    }

    fn expand(&self, template: &str) -> String {
        template
            .replace("{school}", &self.name)
            .replace("{description}", &self.description)
    }
}

/// A contiguous span of source text, the unit of retrieval.
///
/// Offsets are character (not byte) positions in the source document so
/// that citations stay meaningful for multi-byte scripts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Stable identifier: `{school}:{source}#{ordinal}`.
    pub id: String,
    pub school_id: String,
    /// Source document identifier (path relative to the school's data dir).
    pub source: String,
    /// Position of this chunk within its source document.
    pub ordinal: usize,
    /// Inclusive start character offset.
    pub start: usize,
    /// Exclusive end character offset.
    pub end: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A chunk paired with its similarity to a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Ranked evidence for one query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub school_id: String,
    /// Ordered by descending score, at most `top_k` long.
    pub hits: Vec<ScoredChunk>,
    /// Scalar summary of `hits` used by the scope gate.
    pub confidence: f32,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn contains_chunk(&self, chunk_id: &str) -> bool {
        self.hits.iter().any(|h| h.chunk.id == chunk_id)
    }
}

/// Requested response style.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Favour guiding questions over direct assertions.
    #[default]
    Socratic,
    /// Answer directly.
    Direct,
}

impl std::str::FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "socratic" => Ok(ResponseMode::Socratic),
            "direct" => Ok(ResponseMode::Direct),
            other => Err(format!(
                "unknown response mode '{}': expected socratic or direct",
                other
            )),
        }
    }
}

/// One user turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Query {
    pub id: String,
    pub question: String,
    pub school_id: String,
    pub mode: ResponseMode,
    pub received_at: DateTime<Utc>,
}

impl Query {
    pub fn new(question: impl Into<String>, school_id: impl Into<String>, mode: ResponseMode) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            question: question.into(),
            school_id: school_id.into(),
            mode,
            received_at: Utc::now(),
        }
    }
}

/// Scope gate outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScopeDecision {
    InScope,
    OutOfScope,
}

/// Reference from a response back to a retrieved chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    pub chunk_id: String,
    pub source: String,
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

impl From<&ScoredChunk> for Citation {
    fn from(hit: &ScoredChunk) -> Self {
        Self {
            chunk_id: hit.chunk.id.clone(),
            source: hit.chunk.source.clone(),
            start: hit.chunk.start,
            end: hit.chunk.end,
            score: hit.score,
        }
    }
}

/// Final answer to a query.
///
/// When `refused` is true the text is the school's refusal template and
/// `citations` is empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub school_id: String,
    pub text: String,
    pub citations: Vec<Citation>,
    pub socratic: bool,
    pub refused: bool,
    pub confidence: f32,
}
