//! Generation request construction.
//!
//! A [`PromptSpec`] has five parts, always in this order:
//!
//! 1. the school's persona instruction,
//! 2. the grounding rule (answer only from the evidence, decline otherwise),
//! 3. the style rule for the requested [`ResponseMode`],
//! 4. the retrieved chunks, labelled `[1]..[n]` with their source ids,
//! 5. the user question.
//!
//! Parts 1–3 form the system message, parts 4–5 the user message. Evidence
//! comes exclusively from the [`RetrievalResult`] passed in, and assembly is
//! a pure function of its inputs.

use serde::{Deserialize, Serialize};

use crate::models::{ResponseMode, RetrievalResult, School};

pub const DEFAULT_GROUNDING: &str = "Chỉ trả lời dựa trên các đoạn tài liệu tham khảo được đánh số bên dưới. \
Không sử dụng kiến thức bên ngoài. Khi dùng một đoạn, hãy ghi số của nó trong ngoặc vuông, ví dụ [1]. \
Nếu tài liệu không đủ để trả lời, hãy lịch sự từ chối. Luôn trả lời bằng tiếng Việt có đầy đủ dấu.";

pub const DEFAULT_SOCRATIC: &str = "Hãy trả lời theo phương pháp Socrates: giải thích ngắn gọn, \
sau đó đặt 1-2 câu hỏi phản tư để dẫn dắt người học suy nghĩ sâu hơn. \
Không đưa ra câu trả lời tuyệt đối và kết thúc bằng một câu hỏi.";

pub const DEFAULT_DIRECT: &str = "Hãy trả lời trực tiếp, ngắn gọn và súc tích.";

/// Instruction texts, overridable from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    pub grounding: String,
    pub socratic: String,
    pub direct: String,
    pub evidence_heading: String,
    pub question_heading: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            grounding: DEFAULT_GROUNDING.to_string(),
            socratic: DEFAULT_SOCRATIC.to_string(),
            direct: DEFAULT_DIRECT.to_string(),
            evidence_heading: "Tài liệu tham khảo:".to_string(),
            question_heading: "Câu hỏi của người dùng:".to_string(),
        }
    }
}

/// One retrieved chunk as presented to the generator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    /// 1-based marker the generator may cite as `[label]`.
    pub label: usize,
    pub chunk_id: String,
    pub source: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Structured generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptSpec {
    pub school_id: String,
    /// Display name of the school, for generators that phrase text themselves.
    pub school_name: String,
    pub mode: ResponseMode,
    pub system: String,
    pub evidence: Vec<Evidence>,
    pub question: String,
    evidence_heading: String,
    question_heading: String,
}

impl PromptSpec {
    /// Render the evidence block and the question as the user message.
    pub fn user_content(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.evidence_heading);
        out.push_str("\n---\n");
        for e in &self.evidence {
            out.push_str(&format!("[{}] ({})\n{}\n\n", e.label, e.source, e.text));
        }
        out.push_str("---\n\n");
        out.push_str(&self.question_heading);
        out.push(' ');
        out.push_str(&self.question);
        out
    }

    /// System + user chat messages for chat-completion style services.
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: Role::System,
                content: self.system.clone(),
            },
            ChatMessage {
                role: Role::User,
                content: self.user_content(),
            },
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromptAssembler {
    templates: PromptTemplates,
}

impl PromptAssembler {
    pub fn new(templates: PromptTemplates) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &PromptTemplates {
        &self.templates
    }

    pub fn assemble(
        &self,
        question: &str,
        school: &School,
        retrieval: &RetrievalResult,
        mode: ResponseMode,
    ) -> PromptSpec {
        let style = match mode {
            ResponseMode::Socratic => &self.templates.socratic,
            ResponseMode::Direct => &self.templates.direct,
        };
        let system = format!(
            "{}\n\n{}\n\n{}",
            school.persona_text(),
            self.templates.grounding,
            style
        );

        let evidence = retrieval
            .hits
            .iter()
            .enumerate()
            .map(|(i, hit)| Evidence {
                label: i + 1,
                chunk_id: hit.chunk.id.clone(),
                source: hit.chunk.source.clone(),
                text: hit.chunk.text.clone(),
            })
            .collect();

        PromptSpec {
            school_id: school.id.clone(),
            school_name: school.name.clone(),
            mode,
            system,
            evidence,
            question: question.trim().to_string(),
            evidence_heading: self.templates.evidence_heading.clone(),
            question_heading: self.templates.question_heading.clone(),
        }
    }
}
