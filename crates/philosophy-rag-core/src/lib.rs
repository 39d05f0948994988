//! # philosophy-rag-core
//!
//! Retrieval-augmented dialogue engine for philosophy schools, with no
//! dependency on a runtime, a database or the network.
//!
//! A turn flows through these modules:
//!
//! | Step | Module |
//! |------|--------|
//! | look up the school | [`schools`] |
//! | embed the question and search the school's index | [`retrieve`], [`catalog`], [`index`] |
//! | accept or refuse | [`scope`] |
//! | build the generation request | [`prompt`] |
//! | generate | [`generate`] |
//! | attach citations and the Socratic flag | [`compose`] |
//!
//! [`engine::DialogueEngine`] drives the whole turn. Indexes are built
//! offline from [`chunk`]ed documents through an [`embedding::Embedder`].
//!
//! Network providers, persistence and the evaluation harness live in the
//! `philosophy-rag` application crate.

pub mod catalog;
pub mod chunk;
pub mod compose;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generate;
pub mod index;
pub mod models;
pub mod prompt;
pub mod retrieve;
pub mod schools;
pub mod scope;

pub use error::{ErrorCategory, RagError, Result};
