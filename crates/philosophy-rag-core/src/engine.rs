//! Per-turn orchestration.
//!
//! ```text
//! Received ─retrieve─▶ Retrieved ─scope─▶ Scoped ─┬─ out of scope ─▶ Refused ───┐
//!                                                 └─ generate ────▶ Generated ─┴▶ Composed ─▶ Done
//! ```
//!
//! Any component failure ends the turn in `Failed`, reported as a
//! [`TurnError`] that records the state the turn had reached. Nothing is
//! retried and nothing is carried from one turn to the next, so repeating a
//! failed turn with the same question and school is safe.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::Instrument;

use crate::compose::ResponseComposer;
use crate::error::{ErrorCategory, RagError};
use crate::generate::Generator;
use crate::models::{Query, Response, ResponseMode, ScopeDecision};
use crate::prompt::PromptAssembler;
use crate::retrieve::Retriever;
use crate::schools::SchoolRegistry;
use crate::scope::ScopePolicy;

/// Generic apology shown when a turn fails. Never equal to a refusal.
pub const APOLOGY: &str =
    "Xin lỗi, hệ thống tạm thời không thể trả lời câu hỏi của bạn. Vui lòng thử lại sau.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Received,
    Retrieved,
    Scoped,
    Refused,
    Generated,
    Composed,
    Done,
    Failed,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnState::Received => "received",
            TurnState::Retrieved => "retrieved",
            TurnState::Scoped => "scoped",
            TurnState::Refused => "refused",
            TurnState::Generated => "generated",
            TurnState::Composed => "composed",
            TurnState::Done => "done",
            TurnState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A turn that ended in `Failed`.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("turn failed after reaching '{stage}': {source}")]
pub struct TurnError {
    /// Last state reached before the failing component ran.
    pub stage: TurnState,
    #[source]
    pub source: RagError,
}

impl TurnError {
    pub fn category(&self) -> ErrorCategory {
        self.source.category()
    }

    pub fn code(&self) -> &'static str {
        self.source.code()
    }

    pub fn user_message(&self) -> &'static str {
        APOLOGY
    }
}

/// Answers one question at a time; shareable across tasks.
pub struct DialogueEngine {
    schools: Arc<SchoolRegistry>,
    retriever: Retriever,
    assembler: PromptAssembler,
    generator: Arc<dyn Generator>,
    composer: ResponseComposer,
}

impl DialogueEngine {
    pub fn new(schools: Arc<SchoolRegistry>, retriever: Retriever, generator: Arc<dyn Generator>) -> Self {
        Self {
            schools,
            retriever,
            assembler: PromptAssembler::default(),
            generator,
            composer: ResponseComposer::default(),
        }
    }

    pub fn with_assembler(mut self, assembler: PromptAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn with_composer(mut self, composer: ResponseComposer) -> Self {
        self.composer = composer;
        self
    }

    pub fn schools(&self) -> &SchoolRegistry {
        &self.schools
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub async fn respond(
        &self,
        question: &str,
        school_id: &str,
        mode: ResponseMode,
    ) -> Result<Response, TurnError> {
        self.respond_to(&Query::new(question, school_id, mode)).await
    }

    pub async fn respond_to(&self, query: &Query) -> Result<Response, TurnError> {
        let span = tracing::debug_span!("turn", id = %query.id, school = %query.school_id);
        self.run(query).instrument(span).await
    }

    async fn run(&self, query: &Query) -> Result<Response, TurnError> {
        let mut stage = TurnState::Received;
        let fail = |stage: TurnState, source: RagError| {
            tracing::warn!(%stage, code = source.code(), error = %source, "turn failed");
            TurnError { stage, source }
        };

        let school = self
            .schools
            .get(&query.school_id)
            .map_err(|e| fail(stage, e))?;

        let retrieval = self
            .retriever
            .retrieve(&query.question, &school.id)
            .await
            .map_err(|e| fail(stage, e))?;
        stage = advance(stage, TurnState::Retrieved);

        let decision =
            ScopePolicy::new(&school.off_topic_terms).evaluate(&query.question, &retrieval, school.threshold);
        stage = advance(stage, TurnState::Scoped);
        tracing::debug!(confidence = retrieval.confidence, threshold = school.threshold, ?decision, "scoped");

        let response = match decision {
            ScopeDecision::OutOfScope => {
                stage = advance(stage, TurnState::Refused);
                self.composer.compose(decision, school, None, &retrieval)
            }
            ScopeDecision::InScope => {
                let prompt = self
                    .assembler
                    .assemble(&query.question, school, &retrieval, query.mode);
                let text = self
                    .generator
                    .generate(&prompt)
                    .await
                    .map_err(|e| fail(stage, e))?;
                stage = advance(stage, TurnState::Generated);
                self.composer.compose(decision, school, Some(&text), &retrieval)
            }
        };
        stage = advance(stage, TurnState::Composed);
        advance(stage, TurnState::Done);
        Ok(response)
    }
}

fn advance(from: TurnState, to: TurnState) -> TurnState {
    tracing::debug!(%from, %to, "transition");
    to
}
