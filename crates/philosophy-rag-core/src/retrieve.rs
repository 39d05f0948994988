//! Query embedding, index search and confidence scoring.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::IndexCatalog;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::models::{RetrievalResult, ScoredChunk};

/// How the scalar confidence is summarised from the ranked hits.
///
/// In TOML: `confidence = "top1"` or `confidence = { mean_top = 3 }`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceStrategy {
    /// Score of the best hit.
    #[default]
    Top1,
    /// Mean score of the best `n` hits (fewer if fewer were retrieved).
    MeanTop(usize),
}

impl ConfidenceStrategy {
    /// Summarise `hits`, which must already be sorted best first.
    /// An empty slice has confidence `0.0`.
    pub fn confidence(&self, hits: &[ScoredChunk]) -> f32 {
        let n = match self {
            ConfidenceStrategy::Top1 => 1,
            ConfidenceStrategy::MeanTop(n) => (*n).max(1),
        };
        let top = &hits[..n.min(hits.len())];
        if top.is_empty() {
            return 0.0;
        }
        top.iter().map(|h| h.score).sum::<f32>() / top.len() as f32
    }
}

/// Turns a question into ranked evidence for one school.
pub struct Retriever {
    catalog: Arc<IndexCatalog>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    strategy: ConfidenceStrategy,
}

impl Retriever {
    pub fn new(
        catalog: Arc<IndexCatalog>,
        embedder: Arc<dyn Embedder>,
        top_k: usize,
        strategy: ConfidenceStrategy,
    ) -> Self {
        Self {
            catalog,
            embedder,
            top_k,
            strategy,
        }
    }

    pub fn catalog(&self) -> &Arc<IndexCatalog> {
        &self.catalog
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve the top-k chunks for `question` from `school_id`'s index.
    ///
    /// The index is resolved before the embedding call, so an unknown
    /// school or unbuilt index never costs an external request. Embedding
    /// failures are returned as-is; nothing is retried here.
    pub async fn retrieve(&self, question: &str, school_id: &str) -> Result<RetrievalResult> {
        let index = self.catalog.get(school_id)?;
        index.ensure_model(self.embedder.model_name())?;

        let query = self.embedder.embed_one(question).await?;
        let hits = index.search(&query, self.top_k)?;
        let confidence = self.strategy.confidence(&hits);

        tracing::debug!(
            school = school_id,
            hits = hits.len(),
            confidence,
            "retrieved evidence"
        );

        Ok(RetrievalResult {
            school_id: school_id.to_string(),
            hits,
            confidence,
        })
    }
}
