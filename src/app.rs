//! Process bootstrap: config in, ready-to-use dialogue engine out.
//!
//! Every long-lived component is built here once and shared by reference
//! counting: the school registry, the index catalog, the embedder and the
//! generator. Persisted indexes are loaded into the catalog at startup; a
//! school with no stored index stays "not ready" until `philo build` runs.

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use philosophy_rag_core::catalog::IndexCatalog;
use philosophy_rag_core::compose::{ResponseComposer, SocraticHeuristic};
use philosophy_rag_core::embedding::Embedder;
use philosophy_rag_core::engine::DialogueEngine;
use philosophy_rag_core::generate::Generator;
use philosophy_rag_core::prompt::PromptAssembler;
use philosophy_rag_core::retrieve::Retriever;
use philosophy_rag_core::schools::SchoolRegistry;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::store::IndexStore;

/// Install the global tracing subscriber. Logs go to stderr; `RUST_LOG`
/// overrides the default `info` level.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

/// Everything a front end (CLI, HTTP server, evaluation) needs.
pub struct App {
    pub config: Config,
    pub registry: Arc<SchoolRegistry>,
    pub catalog: Arc<IndexCatalog>,
    pub engine: Arc<DialogueEngine>,
    pub store: IndexStore,
}

/// Build the engine from configuration and load persisted indexes.
pub async fn bootstrap(config: Config) -> Result<App> {
    let registry = Arc::new(config.school_registry()?);
    let catalog = Arc::new(IndexCatalog::new(registry.ids()));
    let embedder = create_embedder(&config.embedding)?;
    let generator = create_generator(&config)?;

    let store = IndexStore::open(&config).await?;
    let loaded = load_indexes(&store, &catalog, embedder.as_ref()).await?;
    tracing::info!(loaded, schools = registry.len(), "indexes loaded");

    let engine = Arc::new(assemble_engine(
        &config,
        Arc::clone(&registry),
        Arc::clone(&catalog),
        embedder,
        generator,
    ));

    Ok(App {
        config,
        registry,
        catalog,
        engine,
        store,
    })
}

/// Wire the engine from already-constructed components.
pub fn assemble_engine(
    config: &Config,
    registry: Arc<SchoolRegistry>,
    catalog: Arc<IndexCatalog>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
) -> DialogueEngine {
    let retriever = Retriever::new(
        catalog,
        embedder,
        config.retrieval.top_k,
        config.retrieval.confidence,
    );
    DialogueEngine::new(registry, retriever, generator)
        .with_assembler(PromptAssembler::new(config.prompt.clone()))
        .with_composer(ResponseComposer::new(SocraticHeuristic::new(
            config.socratic.lead_phrases.iter().cloned(),
        )))
}

/// Install every stored index into the catalog. Returns how many loaded.
///
/// An index built by another embedding model is still installed: turns
/// against it fail with `ModelMismatch`, which names both models, instead
/// of the less helpful `IndexNotReady`. Corrupt indexes are skipped.
pub async fn load_indexes(
    store: &IndexStore,
    catalog: &IndexCatalog,
    embedder: &dyn Embedder,
) -> Result<usize> {
    let ids: Vec<String> = catalog.school_ids().map(str::to_string).collect();
    let mut loaded = 0usize;
    for id in ids {
        let index = match store.load(&id).await {
            Ok(Some(index)) => index,
            Ok(None) => {
                tracing::debug!(school = %id, "no stored index");
                continue;
            }
            Err(e) => {
                tracing::warn!(school = %id, error = %e, "skipping unreadable stored index");
                continue;
            }
        };
        if let Err(e) = index.ensure_model(embedder.model_name()) {
            tracing::warn!(school = %id, error = %e, "stored index needs a rebuild");
        }
        catalog.install(index)?;
        loaded += 1;
    }
    Ok(loaded)
}
