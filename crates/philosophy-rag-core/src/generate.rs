//! Text generation boundary.
//!
//! The engine only sees the [`Generator`] trait. Network-backed providers
//! live in the application crate; [`ExtractiveGenerator`] is the offline
//! fallback that quotes the best evidence and appends reflection questions.

use std::collections::HashMap;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::{ResponseMode, School};
use crate::prompt::PromptSpec;

/// A language generation service.
///
/// Output is untrusted free text: callers must not assume it contains
/// well-formed citations or any particular structure.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Provider/model label used in logs.
    fn name(&self) -> &str;

    /// Produce a reply for `prompt`. Fails with
    /// [`RagError::GeneratorUnavailable`](crate::error::RagError::GeneratorUnavailable)
    /// or [`RagError::GeneratorTimeout`](crate::error::RagError::GeneratorTimeout).
    async fn generate(&self, prompt: &PromptSpec) -> Result<String>;
}

const SOCRATIC_EXCERPT_CHARS: usize = 200;
const DIRECT_EXCERPT_CHARS: usize = 300;
const QUESTIONS_PER_REPLY: usize = 2;

const FALLBACK_QUESTIONS: [&str; 2] = [
    "Điều này có ý nghĩa gì với cuộc sống của bạn?",
    "Bạn có thể áp dụng nguyên lý này như thế nào?",
];

/// Deterministic, model-free generator.
///
/// Socratic replies quote the top evidence and close with reflection
/// questions drawn from the school's pool; the pool offset is derived from
/// a hash of the question so identical turns give identical text.
#[derive(Debug, Clone, Default)]
pub struct ExtractiveGenerator {
    questions: HashMap<String, Vec<String>>,
}

impl ExtractiveGenerator {
    pub fn new<'a>(schools: impl IntoIterator<Item = &'a School>) -> Self {
        Self {
            questions: schools
                .into_iter()
                .map(|s| (s.id.clone(), s.reflection_questions.clone()))
                .collect(),
        }
    }

    fn reflection_questions(&self, school_id: &str, question: &str) -> Vec<String> {
        let pool: Vec<String> = match self.questions.get(school_id) {
            Some(pool) if !pool.is_empty() => pool.clone(),
            _ => FALLBACK_QUESTIONS.iter().map(|q| q.to_string()).collect(),
        };
        let digest = Sha256::digest(question.as_bytes());
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        let offset = (u64::from_le_bytes(seed) % pool.len() as u64) as usize;
        (0..QUESTIONS_PER_REPLY.min(pool.len()))
            .map(|i| pool[(offset + i) % pool.len()].clone())
            .collect()
    }
}

#[async_trait]
impl Generator for ExtractiveGenerator {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn generate(&self, prompt: &PromptSpec) -> Result<String> {
        let Some(top) = prompt.evidence.first() else {
            return Ok(format!(
                "Xin lỗi, tôi không tìm thấy thông tin về '{}' trong tài liệu về {}.",
                prompt.question, prompt.school_name
            ));
        };

        let text = match prompt.mode {
            ResponseMode::Socratic => {
                let mut out = format!(
                    "Theo tài liệu về {}, {} [{}]\n\nĐể hiểu sâu hơn, bạn có thể suy ngẫm:",
                    prompt.school_name,
                    excerpt(&top.text, SOCRATIC_EXCERPT_CHARS),
                    top.label
                );
                for q in self.reflection_questions(&prompt.school_id, &prompt.question) {
                    out.push_str("\n- ");
                    out.push_str(&q);
                }
                out
            }
            ResponseMode::Direct => format!(
                "Dựa trên tài liệu về {}: {} [{}]",
                prompt.school_name,
                excerpt(&top.text, DIRECT_EXCERPT_CHARS),
                top.label
            ),
        };
        Ok(text)
    }
}

/// First `max` characters of `text`, with an ellipsis when truncated.
fn excerpt(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max).collect();
    out.push_str("...");
    out
}
