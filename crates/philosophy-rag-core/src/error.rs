//! Error taxonomy for the dialogue engine.
//!
//! Every failure a turn can hit maps to one [`RagError`] variant. Variants
//! are grouped into three [`ErrorCategory`] buckets so callers can tell a
//! misconfiguration (fatal until fixed) from a caller mistake (fix the
//! request) from a flaky external service (the whole turn may be retried).
//!
//! Scope-gate misclassification is deliberately absent: refusing an
//! answerable question is a quality problem measured by the evaluation
//! harness, not an error.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the core components.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RagError {
    /// Invalid chunking, threshold or retrieval configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// An index build was attempted with no chunks.
    #[error("cannot build index for school '{school}': corpus is empty")]
    EmptyCorpus { school: String },

    /// The school exists but no index has been built or loaded for it.
    #[error("index for school '{school}' is not ready")]
    IndexNotReady { school: String },

    /// The school id does not reference a configured school.
    #[error("unknown school: '{0}'")]
    UnknownSchool(String),

    /// The embedding service failed or timed out.
    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    /// The generation service could not be reached or returned an error.
    #[error("generator unavailable: {0}")]
    GeneratorUnavailable(String),

    /// The generation service did not answer within the configured timeout.
    #[error("generator timed out after {}s", .after.as_secs())]
    GeneratorTimeout { after: Duration },

    /// A vector's length does not match the index dimensionality.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A persisted index was built with a different embedding model.
    #[error("index for school '{school}' was built with model '{indexed}', but the embedder is '{active}'")]
    ModelMismatch {
        school: String,
        indexed: String,
        active: String,
    },

    /// Another build of the same school's index is in flight.
    #[error("an index rebuild for school '{school}' is already in progress")]
    RebuildInProgress { school: String },
}

/// Coarse classification of a [`RagError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration or index misuse; persists until an operator fixes it.
    Fatal,
    /// The request itself is wrong; surfaced immediately.
    CallerError,
    /// External service hiccup; the caller may retry the whole turn.
    Transient,
}

impl RagError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RagError::Config(_)
            | RagError::EmptyCorpus { .. }
            | RagError::IndexNotReady { .. }
            | RagError::DimensionMismatch { .. }
            | RagError::ModelMismatch { .. } => ErrorCategory::Fatal,
            RagError::UnknownSchool(_) => ErrorCategory::CallerError,
            RagError::EmbeddingService(_)
            | RagError::GeneratorUnavailable(_)
            | RagError::GeneratorTimeout { .. }
            | RagError::RebuildInProgress { .. } => ErrorCategory::Transient,
        }
    }

    /// Stable machine-readable code, used in HTTP error bodies and reports.
    pub fn code(&self) -> &'static str {
        match self {
            RagError::Config(_) => "config_error",
            RagError::EmptyCorpus { .. } => "empty_corpus",
            RagError::IndexNotReady { .. } => "index_not_ready",
            RagError::UnknownSchool(_) => "unknown_school",
            RagError::EmbeddingService(_) => "embedding_service_error",
            RagError::GeneratorUnavailable(_) => "generator_unavailable",
            RagError::GeneratorTimeout { .. } => "generator_timeout",
            RagError::DimensionMismatch { .. } => "dimension_mismatch",
            RagError::ModelMismatch { .. } => "model_mismatch",
            RagError::RebuildInProgress { .. } => "rebuild_in_progress",
        }
    }
}

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, RagError>;
