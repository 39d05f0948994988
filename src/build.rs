//! Index build pipeline.
//!
//! `scan → chunk → embed → persist → install` for one school at a time.
//! The catalog's rebuild guard is held for the whole pipeline, so two
//! builds of the same school never interleave and readers keep using the
//! previous index until the new one is committed.
//!
//! A school whose documents hash to the value recorded with its stored
//! index, built by the same embedding model, metric and chunking window, is
//! reloaded from the database instead of being re-embedded (unless `--full`
//! is given).

use anyhow::{bail, Result};
use serde::Serialize;

use philosophy_rag_core::catalog::IndexCatalog;
use philosophy_rag_core::chunk::Chunker;
use philosophy_rag_core::embedding::Embedder;
use philosophy_rag_core::index::IndexBuilder;
use philosophy_rag_core::models::{Chunk, School};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::progress::{BuildProgressEvent, BuildProgressReporter, ProgressMode};
use crate::sources::{corpus_hash, scan_school_documents};
use crate::store::IndexStore;

/// Outcome of building one school's index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildSummary {
    pub school_id: String,
    pub documents: usize,
    pub chunks: usize,
    pub model: String,
    pub corpus_hash: String,
    /// The stored index was reused without re-embedding.
    pub reused: bool,
}

/// Build, persist and install the index of one school.
pub async fn build_school_index(
    config: &Config,
    school: &School,
    embedder: &dyn Embedder,
    catalog: &IndexCatalog,
    store: &IndexStore,
    reporter: &dyn BuildProgressReporter,
    full: bool,
) -> Result<BuildSummary> {
    let guard = catalog.begin_rebuild(&school.id)?;

    reporter.report(BuildProgressEvent::Scanning {
        school: school.id.clone(),
    });
    let docs = scan_school_documents(school)?;
    let hash = corpus_hash(&docs);
    let metric = config.retrieval.metric;
    let chunking = config.chunk_config()?;

    if !full {
        if let Some(record) = store.record(&school.id).await? {
            if record.corpus_hash == hash
                && record.model == embedder.model_name()
                && record.metric == metric.as_str()
                && record.chunked_with(chunking)
            {
                if let Some(index) = store.load(&school.id).await? {
                    let chunks = index.len();
                    guard.commit(index)?;
                    tracing::info!(school = %school.id, chunks, "corpus unchanged, reused stored index");
                    reporter.report(BuildProgressEvent::Done {
                        school: school.id.clone(),
                        chunks: chunks as u64,
                    });
                    return Ok(BuildSummary {
                        school_id: school.id.clone(),
                        documents: docs.len(),
                        chunks,
                        model: record.model,
                        corpus_hash: hash,
                        reused: true,
                    });
                }
            }
        }
    }

    let chunker = Chunker::new(chunking);
    let chunks: Vec<Chunk> = docs
        .iter()
        .flat_map(|d| chunker.chunk_document(&school.id, &d.source, &d.text))
        .collect();
    tracing::debug!(school = %school.id, documents = docs.len(), chunks = chunks.len(), "chunked corpus");

    let school_id = school.id.clone();
    let index = IndexBuilder::new(&school.id, metric)
        .batch_size(config.embedding.batch_size)
        .on_batch(move |n, total| {
            reporter.report(BuildProgressEvent::Embedding {
                school: school_id.clone(),
                n: n as u64,
                total: total as u64,
            })
        })
        .build(chunks, embedder)
        .await?;

    store.save(&index, &hash, chunking).await?;
    let index = guard.commit(index)?;

    tracing::info!(
        school = %school.id,
        chunks = index.len(),
        model = index.model(),
        "index built"
    );
    reporter.report(BuildProgressEvent::Done {
        school: school.id.clone(),
        chunks: index.len() as u64,
    });

    Ok(BuildSummary {
        school_id: school.id.clone(),
        documents: docs.len(),
        chunks: index.len(),
        model: index.model().to_string(),
        corpus_hash: hash,
        reused: false,
    })
}

/// `philo build`: build one school (or all of them) and print a summary.
///
/// When building every school, a failure in one does not stop the others;
/// the command still exits non-zero if any school failed.
pub async fn run_build(
    config: &Config,
    school: Option<&str>,
    full: bool,
    progress: ProgressMode,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embeddings are disabled. Set [embedding] provider in config to build indexes.");
    }

    let registry = config.school_registry()?;
    let targets: Vec<&School> = match school {
        Some(id) => vec![registry.get(id)?],
        None => registry.iter().collect(),
    };
    if targets.is_empty() {
        bail!("No schools configured. Add [[schools]] entries to the config.");
    }

    let embedder = create_embedder(&config.embedding)?;
    let store = IndexStore::open(config).await?;
    let catalog = IndexCatalog::new(registry.ids());
    let reporter = progress.reporter();

    let mut failures = 0usize;
    for target in targets {
        match build_school_index(
            config,
            target,
            embedder.as_ref(),
            &catalog,
            &store,
            reporter.as_ref(),
            full,
        )
        .await
        {
            Ok(summary) => {
                println!("build {}", summary.school_id);
                println!("  documents: {}", summary.documents);
                println!("  chunks: {}", summary.chunks);
                println!("  model: {}", summary.model);
                if summary.reused {
                    println!("  unchanged, reused stored index");
                }
            }
            Err(e) => {
                failures += 1;
                tracing::error!(school = %target.id, error = %e, "index build failed");
                eprintln!("build {}  failed: {:#}", target.id, e);
            }
        }
    }

    store.close().await;
    if failures > 0 {
        bail!("{} school index build(s) failed", failures);
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::progress::NoProgress;
    use philosophy_rag_core::embedding::HashingEmbedder;
    use philosophy_rag_core::error::RagError;
    use std::fs;
    use tempfile::TempDir;

    fn config(tmp: &TempDir) -> Config {
        config_with_window(tmp, 40, 10)
    }

    fn config_with_window(tmp: &TempDir, chunk_size: usize, overlap: usize) -> Config {
        let data = tmp.path().join("stoicism");
        fs::create_dir_all(&data).unwrap();
        let text = format!(
            r#"
[db]
path = "{db}"

[chunking]
chunk_size = {chunk_size}
overlap = {overlap}

[embedding]
provider = "hashing"
dims = 32

[[schools]]
id = "stoicism"
name = "Stoicism"
data_dir = "{data}"
"#,
            db = tmp.path().join("philo.sqlite").display(),
            data = data.display(),
            chunk_size = chunk_size,
            overlap = overlap
        );
        parse_config(&text).unwrap()
    }

    #[tokio::test]
    async fn test_build_installs_and_persists() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(&tmp);
        let school = &cfg.resolved_schools()[0];
        fs::write(
            school.data_dir.join("enchiridion.txt"),
            "Some things are within our power, while others are not.",
        )
        .unwrap();

        let store = IndexStore::open(&cfg).await.unwrap();
        let catalog = IndexCatalog::new(["stoicism"]);
        let embedder = HashingEmbedder::new(32);

        let first = build_school_index(&cfg, school, &embedder, &catalog, &store, &NoProgress, false)
            .await
            .unwrap();
        assert!(!first.reused);
        assert_eq!(first.documents, 1);
        assert!(first.chunks >= 2);
        assert!(catalog.is_ready("stoicism"));
        assert_eq!(store.list().await.unwrap()[0].chunk_count, first.chunks);

        let second = build_school_index(&cfg, school, &embedder, &catalog, &store, &NoProgress, false)
            .await
            .unwrap();
        assert!(second.reused);
        assert_eq!(second.chunks, first.chunks);

        let forced = build_school_index(&cfg, school, &embedder, &catalog, &store, &NoProgress, true)
            .await
            .unwrap();
        assert!(!forced.reused);
    }

    #[tokio::test]
    async fn test_chunking_change_forces_rebuild() {
        let tmp = TempDir::new().unwrap();
        let narrow = config_with_window(&tmp, 40, 10);
        let school = &narrow.resolved_schools()[0];
        fs::write(
            school.data_dir.join("enchiridion.txt"),
            "Some things are within our power, while others are not. \
             Within our power are opinion, motivation, desire, aversion.",
        )
        .unwrap();

        let store = IndexStore::open(&narrow).await.unwrap();
        let catalog = IndexCatalog::new(["stoicism"]);
        let embedder = HashingEmbedder::new(32);

        let first = build_school_index(&narrow, school, &embedder, &catalog, &store, &NoProgress, false)
            .await
            .unwrap();
        assert!(first.chunks > 1);

        let wide = config_with_window(&tmp, 200, 0);
        let second = build_school_index(&wide, school, &embedder, &catalog, &store, &NoProgress, false)
            .await
            .unwrap();
        assert!(!second.reused);
        assert_eq!(second.chunks, 1);

        let record = store.record("stoicism").await.unwrap().unwrap();
        assert_eq!((record.chunk_size, record.chunk_overlap), (200, 0));
        let index = catalog.get("stoicism").unwrap();
        assert!(index.entries().iter().all(|e| e.chunk.text.chars().count() <= 200));

        let third = build_school_index(&wide, school, &embedder, &catalog, &store, &NoProgress, false)
            .await
            .unwrap();
        assert!(third.reused);
    }

    #[tokio::test]
    async fn test_empty_corpus_keeps_previous_state() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(&tmp);
        let school = &cfg.resolved_schools()[0];
        let store = IndexStore::open(&cfg).await.unwrap();
        let catalog = IndexCatalog::new(["stoicism"]);

        let err = build_school_index(
            &cfg,
            school,
            &HashingEmbedder::new(32),
            &catalog,
            &store,
            &NoProgress,
            false,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RagError>(),
            Some(RagError::EmptyCorpus { .. })
        ));
        assert!(!catalog.is_ready("stoicism"));
        // The guard was released on failure.
        assert!(catalog.begin_rebuild("stoicism").is_ok());
    }
}
