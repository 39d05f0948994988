//! # Philosophy RAG
//!
//! Socratic dialogue over philosophy schools, grounded in each school's
//! own documents, plus a harness that scores how well it stays in scope.
//!
//! The turn logic (chunking, indexes, retrieval, scope gate, prompts,
//! response composition) lives in the `philosophy-rag-core` crate. This
//! crate owns everything with I/O: configuration, document loading,
//! embedding and generation providers, SQLite persistence, the build
//! pipeline, the evaluation harness, the HTTP server and the CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │ data/raw/<s> │──▶│ Chunk+Embed  │──▶│  SQLite  │
//! │  .txt / .md  │   │ (philo build)│   │ indexes  │
//! └──────────────┘   └──────────────┘   └────┬─────┘
//!                                            │ load
//!                                            ▼
//!                                     ┌──────────────┐
//!                                     │ IndexCatalog │
//!                                     └──────┬───────┘
//!                        ┌───────────────────┼───────────────────┐
//!                        ▼                   ▼                   ▼
//!                   ┌─────────┐        ┌──────────┐        ┌──────────┐
//!                   │   CLI   │        │   HTTP   │        │   Eval   │
//!                   │ (philo) │        │  /chat   │        │ harness  │
//!                   └─────────┘        └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! philo init
//! philo build
//! philo ask "Ý thức là gì?" --school phenomenology
//! philo eval --builtin
//! philo serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`sources`] | Reading a school's raw documents |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Generation providers |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`store`] | Persisted indexes |
//! | [`build`] | Index build pipeline |
//! | [`progress`] | Build progress reporting |
//! | [`app`] | Bootstrap and tracing setup |
//! | [`ask`] / [`status`] | One-shot CLI commands |
//! | [`eval`] | Evaluation harness |
//! | [`server`] | HTTP chat server |

pub mod app;
pub mod ask;
pub mod build;
pub mod config;
pub mod db;
pub mod embedding;
pub mod eval;
pub mod generation;
pub mod migrate;
pub mod progress;
pub mod server;
pub mod sources;
pub mod status;
pub mod store;
