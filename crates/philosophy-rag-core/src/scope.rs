//! Accept/refuse decision for a retrieved question.
//!
//! [`decide`] is the pure threshold gate. [`ScopePolicy`] adds a list of
//! off-topic terms in front of it: a question naming one of them is refused
//! even when the corpus happens to score well against it. Neither step can
//! turn a refusal into an answer as the threshold rises.

use crate::models::{RetrievalResult, ScopeDecision};

/// `InScope` iff the result is non-empty and `confidence >= threshold`.
pub fn decide(result: &RetrievalResult, threshold: f32) -> ScopeDecision {
    if !result.is_empty() && result.confidence >= threshold {
        ScopeDecision::InScope
    } else {
        ScopeDecision::OutOfScope
    }
}

/// Threshold gate preceded by an off-topic term check.
#[derive(Debug, Clone, Default)]
pub struct ScopePolicy {
    off_topic_terms: Vec<String>,
}

impl ScopePolicy {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            off_topic_terms: terms
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// First configured off-topic term that `question` contains.
    pub fn matched_term(&self, question: &str) -> Option<&str> {
        let q = question.to_lowercase();
        self.off_topic_terms
            .iter()
            .find(|t| q.contains(t.as_str()))
            .map(String::as_str)
    }

    pub fn evaluate(&self, question: &str, result: &RetrievalResult, threshold: f32) -> ScopeDecision {
        if let Some(term) = self.matched_term(question) {
            tracing::debug!(term, "question matched off-topic term");
            return ScopeDecision::OutOfScope;
        }
        decide(result, threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ScoredChunk};

    fn result(scores: &[f32]) -> RetrievalResult {
        let hits: Vec<ScoredChunk> = scores
            .iter()
            .enumerate()
            .map(|(i, s)| ScoredChunk {
                chunk: Chunk {
                    id: format!("s:d#{}", i),
                    school_id: "s".into(),
                    source: "d".into(),
                    ordinal: i,
                    start: 0,
                    end: 1,
                    text: "x".into(),
                    hash: String::new(),
                },
                score: *s,
            })
            .collect();
        RetrievalResult {
            school_id: "s".into(),
            confidence: hits.first().map(|h| h.score).unwrap_or(0.0),
            hits,
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert_eq!(decide(&result(&[0.3]), 0.3), ScopeDecision::InScope);
        assert_eq!(decide(&result(&[0.29]), 0.3), ScopeDecision::OutOfScope);
    }

    #[test]
    fn test_empty_result_always_out() {
        let mut empty = result(&[]);
        empty.confidence = 1.0;
        assert_eq!(decide(&empty, -1.0), ScopeDecision::OutOfScope);
    }

    #[test]
    fn test_monotonic_in_threshold() {
        let thresholds: Vec<f32> = (-10..=10).map(|i| i as f32 / 10.0).collect();
        for conf in [-0.5f32, 0.0, 0.25, 0.3, 0.71, 1.0] {
            let r = result(&[conf]);
            let mut seen_out = false;
            for t in &thresholds {
                let d = decide(&r, *t);
                if seen_out {
                    assert_eq!(d, ScopeDecision::OutOfScope, "conf={} t={}", conf, t);
                }
                seen_out |= d == ScopeDecision::OutOfScope;
            }
        }
    }

    #[test]
    fn test_policy_off_topic_terms() {
        let policy = ScopePolicy::new(["Lập trình", "hóa học", "  "]);
        let strong = result(&[0.95]);
        assert_eq!(
            policy.evaluate("Làm sao để LẬP TRÌNH Python?", &strong, 0.3),
            ScopeDecision::OutOfScope
        );
        assert_eq!(policy.matched_term("công thức hóa học của nước"), Some("hóa học"));
        assert_eq!(
            policy.evaluate("Đức hạnh là gì?", &strong, 0.3),
            ScopeDecision::InScope
        );
        assert_eq!(
            policy.evaluate("Đức hạnh là gì?", &result(&[0.1]), 0.3),
            ScopeDecision::OutOfScope
        );
    }
}
