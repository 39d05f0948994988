//! Turns a scope decision and generated text into a [`Response`].

use crate::models::{Citation, Response, RetrievalResult, School, ScopeDecision};

/// Lead phrases recognised as guiding-question openers when none are configured.
pub const DEFAULT_LEAD_PHRASES: [&str; 8] = [
    "hãy suy ngẫm",
    "bạn có thể suy ngẫm",
    "hãy cùng khám phá",
    "hãy cùng tìm hiểu",
    "chúng ta cần đặt câu hỏi",
    "hãy tự hỏi",
    "ask yourself",
    "consider whether",
];

/// Decides whether a reply reads as Socratic.
#[derive(Debug, Clone)]
pub struct SocraticHeuristic {
    lead_phrases: Vec<String>,
}

impl Default for SocraticHeuristic {
    fn default() -> Self {
        Self::new(DEFAULT_LEAD_PHRASES)
    }
}

impl SocraticHeuristic {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            lead_phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// True when the trimmed text ends with a question mark or contains a
    /// lead phrase (case-insensitive).
    pub fn is_socratic(&self, text: &str) -> bool {
        let trimmed = text.trim_end();
        if trimmed.ends_with('?') || trimmed.ends_with('？') {
            return true;
        }
        let lower = trimmed.to_lowercase();
        self.lead_phrases.iter().any(|p| lower.contains(p.as_str()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponseComposer {
    heuristic: SocraticHeuristic,
}

impl ResponseComposer {
    pub fn new(heuristic: SocraticHeuristic) -> Self {
        Self { heuristic }
    }

    /// Build the turn's response.
    ///
    /// `OutOfScope`, or `InScope` without generated text, yields the
    /// school's refusal with no citations. Otherwise citations are the
    /// retrieved chunks the text marks as `[n]`; when it marks none that
    /// resolve, every retrieved chunk is cited.
    pub fn compose(
        &self,
        decision: ScopeDecision,
        school: &School,
        generated: Option<&str>,
        retrieval: &RetrievalResult,
    ) -> Response {
        match (decision, generated) {
            (ScopeDecision::InScope, Some(text)) => Response {
                school_id: school.id.clone(),
                text: text.trim().to_string(),
                citations: cite(text, retrieval),
                socratic: self.heuristic.is_socratic(text),
                refused: false,
                confidence: retrieval.confidence,
            },
            _ => self.refusal(school, retrieval.confidence),
        }
    }

    pub fn refusal(&self, school: &School, confidence: f32) -> Response {
        Response {
            school_id: school.id.clone(),
            text: school.refusal_text(),
            citations: Vec::new(),
            socratic: false,
            refused: true,
            confidence,
        }
    }
}

fn cite(text: &str, retrieval: &RetrievalResult) -> Vec<Citation> {
    let mut used = vec![false; retrieval.hits.len()];
    for label in citation_markers(text) {
        if (1..=used.len()).contains(&label) {
            used[label - 1] = true;
        }
    }
    let any = used.iter().any(|u| *u);
    retrieval
        .hits
        .iter()
        .zip(used)
        .filter(|(_, u)| *u || !any)
        .map(|(hit, _)| Citation::from(hit))
        .collect()
}

/// Numbers found in bracketed markers such as `[2]` or `[1, 3]`.
fn citation_markers(text: &str) -> Vec<usize> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        rest = &rest[open + 1..];
        let Some(close) = rest.find(']') else { break };
        let inner = &rest[..close];
        let labels: Option<Vec<usize>> = inner
            .split(',')
            .map(|part| part.trim().parse::<usize>().ok())
            .collect();
        if let Some(labels) = labels {
            out.extend(labels);
        }
        rest = &rest[close + 1..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ScoredChunk};
    use std::path::PathBuf;

    fn school() -> School {
        School {
            id: "stoicism".into(),
            name: "Stoicism".into(),
            description: "virtue".into(),
            persona: "p".into(),
            data_dir: PathBuf::new(),
            threshold: 0.3,
            refusal: "Câu hỏi này nằm ngoài phạm vi {school}.".into(),
            reflection_questions: vec![],
            off_topic_terms: vec![],
        }
    }

    fn retrieval(n: usize) -> RetrievalResult {
        RetrievalResult {
            school_id: "stoicism".into(),
            hits: (0..n)
                .map(|i| ScoredChunk {
                    chunk: Chunk {
                        id: format!("stoicism:a.txt#{}", i),
                        school_id: "stoicism".into(),
                        source: "a.txt".into(),
                        ordinal: i,
                        start: i * 10,
                        end: i * 10 + 12,
                        text: "t".into(),
                        hash: String::new(),
                    },
                    score: 0.9 - i as f32 * 0.1,
                })
                .collect(),
            confidence: 0.9,
        }
    }

    fn ids(r: &Response) -> Vec<&str> {
        r.citations.iter().map(|c| c.chunk_id.as_str()).collect()
    }

    #[test]
    fn test_refusal_ignores_generated_text() {
        let c = ResponseComposer::default();
        let r = c.compose(ScopeDecision::OutOfScope, &school(), Some("leak [1]"), &retrieval(3));
        assert!(r.refused);
        assert!(r.citations.is_empty());
        assert_eq!(r.text, "Câu hỏi này nằm ngoài phạm vi Stoicism.");
        assert!(!r.socratic);
    }

    #[test]
    fn test_cites_referenced_chunks_only() {
        let c = ResponseComposer::default();
        let r = c.compose(
            ScopeDecision::InScope,
            &school(),
            Some("Per [3] and [1, 3], virtue suffices."),
            &retrieval(3),
        );
        assert!(!r.refused);
        assert_eq!(ids(&r), vec!["stoicism:a.txt#0", "stoicism:a.txt#2"]);
    }

    #[test]
    fn test_unresolvable_markers_cite_everything() {
        let c = ResponseComposer::default();
        let rr = retrieval(2);
        for text in ["No markers at all.", "See [7] and [0] and [abc]."] {
            let r = c.compose(ScopeDecision::InScope, &school(), Some(text), &rr);
            assert_eq!(r.citations.len(), 2);
            for cit in &r.citations {
                assert!(rr.contains_chunk(&cit.chunk_id));
            }
        }
    }

    #[test]
    fn test_socratic_flag() {
        let h = SocraticHeuristic::default();
        assert!(h.is_socratic("Bạn nghĩ sao về điều đó?  \n"));
        assert!(h.is_socratic("Điều gì là thiện？"));
        assert!(h.is_socratic("Trước tiên, HÃY SUY NGẪM về số phận."));
        assert!(!h.is_socratic("Đức hạnh là điều thiện duy nhất."));

        let custom = SocraticHeuristic::new(["what do you think"]);
        assert!(custom.is_socratic("What do you think, friend."));
        assert!(!custom.is_socratic("Hãy suy ngẫm."));
    }

    #[test]
    fn test_in_scope_without_text_refuses() {
        let r = ResponseComposer::default().compose(ScopeDecision::InScope, &school(), None, &retrieval(1));
        assert!(r.refused);
        assert!(r.citations.is_empty());
    }

    #[test]
    fn test_marker_parser() {
        assert_eq!(citation_markers("[1] x [2,3] [ 4 ] [a] [5"), vec![1, 2, 3, 4]);
        assert!(citation_markers("no brackets").is_empty());
    }
}
