//! Per-school knowledge index with brute-force nearest-neighbour search.
//!
//! A [`KnowledgeIndex`] owns every chunk of one school together with its
//! embedding. It is immutable once built: a rebuild produces a brand new
//! index which the [`IndexCatalog`](crate::catalog::IndexCatalog) swaps in
//! whole.
//!
//! Scores are "higher is better" for both metrics so that the scope gate
//! can threshold them uniformly:
//!
//! | Metric | Score |
//! |--------|-------|
//! | `cosine` | cosine similarity in `[-1, 1]` |
//! | `l2` | `1 / (1 + ‖a − b‖)` in `(0, 1]` |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embedding::{cosine_similarity, l2_distance, Embedder};
use crate::error::{RagError, Result};
use crate::models::{Chunk, ScoredChunk};

/// Default number of texts sent to the embedder per request.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Similarity metric; fixed per index so build and search agree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    L2,
}

impl Metric {
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => cosine_similarity(a, b),
            Metric::L2 => 1.0 / (1.0 + l2_distance(a, b)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::L2 => "l2",
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cosine" => Ok(Metric::Cosine),
            "l2" => Ok(Metric::L2),
            other => Err(RagError::Config(format!(
                "unknown metric '{}': expected cosine or l2",
                other
            ))),
        }
    }
}

/// A chunk stored together with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Searchable, read-only collection of one school's chunks.
#[derive(Debug, Clone)]
pub struct KnowledgeIndex {
    school_id: String,
    model: String,
    dims: usize,
    metric: Metric,
    entries: Vec<IndexedChunk>,
    built_at: DateTime<Utc>,
}

impl KnowledgeIndex {
    /// Embed every chunk and build an index with default batching.
    pub async fn build(
        school_id: &str,
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
        metric: Metric,
    ) -> Result<Self> {
        IndexBuilder::new(school_id, metric)
            .build(chunks, embedder)
            .await
    }

    /// Reassemble an index from persisted parts without re-embedding.
    pub fn from_parts(
        school_id: &str,
        model: &str,
        metric: Metric,
        entries: Vec<IndexedChunk>,
        built_at: DateTime<Utc>,
    ) -> Result<Self> {
        let first = entries.first().ok_or_else(|| RagError::EmptyCorpus {
            school: school_id.to_string(),
        })?;
        let dims = first.vector.len();
        for entry in &entries {
            check_membership(school_id, &entry.chunk)?;
            if entry.vector.len() != dims {
                return Err(RagError::DimensionMismatch {
                    expected: dims,
                    actual: entry.vector.len(),
                });
            }
        }
        Ok(Self {
            school_id: school_id.to_string(),
            model: model.to_string(),
            dims,
            metric,
            entries,
            built_at,
        })
    }

    /// Return up to `k` chunks nearest to `query`, best first.
    ///
    /// Equal scores keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if query.len() != self.dims {
            return Err(RagError::DimensionMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }

        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                score: self.metric.score(query, &e.vector),
            })
            .collect();

        // sort_by is stable, which gives the insertion-order tie break.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    /// Fail unless this index was built with `model`.
    pub fn ensure_model(&self, model: &str) -> Result<()> {
        if self.model != model {
            return Err(RagError::ModelMismatch {
                school: self.school_id.clone(),
                indexed: self.model.clone(),
                active: model.to_string(),
            });
        }
        Ok(())
    }

    pub fn school_id(&self) -> &str {
        &self.school_id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexedChunk] {
        &self.entries
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

/// Configurable index construction with batch progress callbacks.
pub struct IndexBuilder<'a> {
    school_id: String,
    metric: Metric,
    batch_size: usize,
    on_batch: Option<Box<dyn FnMut(usize, usize) + Send + 'a>>,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(school_id: &str, metric: Metric) -> Self {
        Self {
            school_id: school_id.to_string(),
            metric,
            batch_size: DEFAULT_BATCH_SIZE,
            on_batch: None,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Called after every embedded batch with `(embedded_so_far, total)`.
    pub fn on_batch(mut self, f: impl FnMut(usize, usize) + Send + 'a) -> Self {
        self.on_batch = Some(Box::new(f));
        self
    }

    pub async fn build(mut self, chunks: Vec<Chunk>, embedder: &dyn Embedder) -> Result<KnowledgeIndex> {
        if chunks.is_empty() {
            return Err(RagError::EmptyCorpus {
                school: self.school_id,
            });
        }
        for chunk in &chunks {
            check_membership(&self.school_id, chunk)?;
        }

        let dims = embedder.dims();
        let total = chunks.len();
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(total);

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = embedder.embed(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(RagError::EmbeddingService(format!(
                    "expected {} vectors, got {}",
                    texts.len(),
                    embedded.len()
                )));
            }
            for v in &embedded {
                if v.len() != dims {
                    return Err(RagError::DimensionMismatch {
                        expected: dims,
                        actual: v.len(),
                    });
                }
            }
            vectors.extend(embedded);
            if let Some(cb) = self.on_batch.as_mut() {
                cb(vectors.len(), total);
            }
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedChunk { chunk, vector })
            .collect();

        Ok(KnowledgeIndex {
            school_id: self.school_id,
            model: embedder.model_name().to_string(),
            dims,
            metric: self.metric,
            entries,
            built_at: Utc::now(),
        })
    }
}

fn check_membership(school_id: &str, chunk: &Chunk) -> Result<()> {
    if chunk.school_id != school_id {
        return Err(RagError::Config(format!(
            "chunk '{}' belongs to school '{}', not '{}'",
            chunk.id, chunk.school_id, school_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkConfig, Chunker};
    use crate::embedding::HashingEmbedder;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Embeds by exact lookup; unknown texts map to the zero vector.
    struct TableEmbedder {
        table: HashMap<String, Vec<f32>>,
        dims: usize,
    }

    #[async_trait]
    impl Embedder for TableEmbedder {
        fn model_name(&self) -> &str {
            "table"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| self.table.get(t).cloned().unwrap_or(vec![0.0; self.dims]))
                .collect())
        }
    }

    fn chunk(school: &str, ordinal: usize, text: &str) -> Chunk {
        Chunk {
            id: format!("{}:doc#{}", school, ordinal),
            school_id: school.to_string(),
            source: "doc".to_string(),
            ordinal,
            start: 0,
            end: text.chars().count(),
            text: text.to_string(),
            hash: String::new(),
        }
    }

    fn table(pairs: &[(&str, [f32; 2])]) -> TableEmbedder {
        TableEmbedder {
            table: pairs
                .iter()
                .map(|(t, v)| (t.to_string(), v.to_vec()))
                .collect(),
            dims: 2,
        }
    }

    #[tokio::test]
    async fn test_build_empty_corpus_fails() {
        let e = HashingEmbedder::new(8);
        let err = KnowledgeIndex::build("stoicism", vec![], &e, Metric::Cosine)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RagError::EmptyCorpus {
                school: "stoicism".into()
            }
        );
    }

    #[tokio::test]
    async fn test_build_rejects_foreign_chunk() {
        let e = HashingEmbedder::new(8);
        let chunks = vec![chunk("stoicism", 0, "a"), chunk("nihilism", 1, "b")];
        let err = KnowledgeIndex::build("stoicism", chunks, &e, Metric::Cosine)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[tokio::test]
    async fn test_search_sorted_and_bounded() {
        let e = HashingEmbedder::new(128);
        let text = "Virtue is sufficient for happiness. Externals are indifferent. \
                    The obstacle is the way. Memento mori. Amor fati.";
        let chunker = Chunker::new(ChunkConfig::new(24, 6).unwrap());
        let chunks: Vec<Chunk> = chunker.chunk_document("stoicism", "notes.txt", text).collect();
        let n = chunks.len();
        let index = KnowledgeIndex::build("stoicism", chunks, &e, Metric::Cosine)
            .await
            .unwrap();
        assert_eq!(index.len(), n);

        let q = e.embed_text("the obstacle is the way");
        for k in [0, 1, 3, n, n + 5] {
            let hits = index.search(&q, k).unwrap();
            assert!(hits.len() <= k);
            assert!(hits.len() <= n);
            for pair in hits.windows(2) {
                assert!(pair[0].score >= pair[1].score);
            }
        }
    }

    #[tokio::test]
    async fn test_ties_broken_by_insertion_order() {
        let e = table(&[("first", [1.0, 0.0]), ("second", [1.0, 0.0]), ("third", [0.0, 1.0])]);
        let chunks = vec![
            chunk("s", 0, "third"),
            chunk("s", 1, "first"),
            chunk("s", 2, "second"),
        ];
        let index = KnowledgeIndex::build("s", chunks, &e, Metric::Cosine)
            .await
            .unwrap();
        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        let order: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_l2_metric_prefers_nearest() {
        let e = table(&[("near", [1.0, 1.0]), ("far", [5.0, 5.0])]);
        let chunks = vec![chunk("s", 0, "far"), chunk("s", 1, "near")];
        let index = KnowledgeIndex::build("s", chunks, &e, Metric::L2).await.unwrap();
        let hits = index.search(&[1.0, 1.0], 2).unwrap();
        assert_eq!(hits[0].chunk.text, "near");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!(hits[1].score < hits[0].score);
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch() {
        let e = HashingEmbedder::new(8);
        let index = KnowledgeIndex::build("s", vec![chunk("s", 0, "logos")], &e, Metric::Cosine)
            .await
            .unwrap();
        let err = index.search(&[1.0, 0.0], 1).unwrap_err();
        assert_eq!(
            err,
            RagError::DimensionMismatch {
                expected: 8,
                actual: 2
            }
        );
    }

    #[tokio::test]
    async fn test_batch_progress_and_model_identity() {
        let e = HashingEmbedder::new(8);
        let chunks: Vec<Chunk> = (0..5).map(|i| chunk("s", i, "apatheia")).collect();
        let mut seen = Vec::new();
        let index = IndexBuilder::new("s", Metric::Cosine)
            .batch_size(2)
            .on_batch(|done, total| seen.push((done, total)))
            .build(chunks, &e)
            .await
            .unwrap();
        assert_eq!(seen, vec![(2, 5), (4, 5), (5, 5)]);
        assert!(index.ensure_model("hashing-8").is_ok());
        assert!(matches!(
            index.ensure_model("text-embedding-3-small"),
            Err(RagError::ModelMismatch { .. })
        ));
    }

    #[test]
    fn test_from_parts_validates() {
        let entries = vec![
            IndexedChunk {
                chunk: chunk("s", 0, "a"),
                vector: vec![1.0, 0.0],
            },
            IndexedChunk {
                chunk: chunk("s", 1, "b"),
                vector: vec![1.0],
            },
        ];
        assert!(matches!(
            KnowledgeIndex::from_parts("s", "m", Metric::Cosine, entries, Utc::now()),
            Err(RagError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            KnowledgeIndex::from_parts("s", "m", Metric::Cosine, vec![], Utc::now()),
            Err(RagError::EmptyCorpus { .. })
        ));
    }
}
