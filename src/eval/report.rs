//! Evaluation report: per-scenario records and aggregate metrics.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use philosophy_rag_core::models::ResponseMode;

/// How one scenario ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    /// Refusal matched expectation, and an answered turn carried citations.
    Passed,
    /// The turn completed but refused when it should have answered, answered
    /// when it should have refused, or answered without citations.
    WrongAnswer,
    /// The turn failed; no response was produced.
    Errored {
        code: String,
        stage: String,
        message: String,
    },
}

/// Observed behaviour of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub id: String,
    pub school_id: String,
    pub question: String,
    pub expected_in_scope: bool,
    pub outcome: ScenarioOutcome,
    /// `None` when the turn errored.
    pub refused: Option<bool>,
    pub citations: usize,
    pub socratic: bool,
    pub confidence: Option<f32>,
    /// Whether an expected keyword appeared; `None` if none were listed or
    /// the turn did not produce an answer.
    pub keyword_hit: Option<bool>,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl ScenarioResult {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ScenarioOutcome::Errored { .. })
    }

    /// Completed and not refused.
    pub fn answered(&self) -> bool {
        self.refused == Some(false)
    }
}

/// Aggregate rates over a batch of results. Every rate is in `[0, 1]`;
/// a rate whose denominator is empty is `0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total: usize,
    pub passed: usize,
    pub wrong_answers: usize,
    pub errors: usize,
    /// In-scope scenarios answered (not refused). Errored turns count as misses.
    pub in_scope_accuracy: f64,
    /// Out-of-scope scenarios refused. Errored turns count as misses.
    pub refusal_accuracy: f64,
    /// Answered turns with at least one citation.
    pub citation_rate: f64,
    /// Answered turns flagged Socratic.
    pub socratic_rate: f64,
    /// Mean end-to-end latency over every scenario, errored ones included.
    pub mean_latency_ms: f64,
    pub overall_accuracy: f64,
    /// Mean retrieval confidence over answered turns.
    pub mean_confidence: f64,
    pub error_rate: f64,
    /// Answered turns with expected keywords that mention at least one.
    pub keyword_hit_rate: f64,
}

fn rate(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl Metrics {
    pub fn compute<'a>(results: impl IntoIterator<Item = &'a ScenarioResult>) -> Self {
        let results: Vec<&ScenarioResult> = results.into_iter().collect();
        let total = results.len();

        let passed = results
            .iter()
            .filter(|r| r.outcome == ScenarioOutcome::Passed)
            .count();
        let errors = results.iter().filter(|r| r.is_error()).count();

        let in_scope: Vec<_> = results.iter().filter(|r| r.expected_in_scope).collect();
        let out_scope: Vec<_> = results.iter().filter(|r| !r.expected_in_scope).collect();
        let answered: Vec<_> = results.iter().filter(|r| r.answered()).collect();

        let in_scope_ok = in_scope.iter().filter(|r| r.answered()).count();
        let refused_ok = out_scope
            .iter()
            .filter(|r| r.refused == Some(true))
            .count();

        let keyword_scored: Vec<bool> = answered.iter().filter_map(|r| r.keyword_hit).collect();

        let mean_latency_ms = if total == 0 {
            0.0
        } else {
            results.iter().map(|r| r.latency_ms as f64).sum::<f64>() / total as f64
        };
        let mean_confidence = if answered.is_empty() {
            0.0
        } else {
            answered
                .iter()
                .map(|r| r.confidence.unwrap_or(0.0) as f64)
                .sum::<f64>()
                / answered.len() as f64
        };

        Self {
            total,
            passed,
            wrong_answers: total - passed - errors,
            errors,
            in_scope_accuracy: rate(in_scope_ok, in_scope.len()),
            refusal_accuracy: rate(refused_ok, out_scope.len()),
            citation_rate: rate(answered.iter().filter(|r| r.citations > 0).count(), answered.len()),
            socratic_rate: rate(answered.iter().filter(|r| r.socratic).count(), answered.len()),
            mean_latency_ms,
            overall_accuracy: rate(passed, total),
            mean_confidence,
            error_rate: rate(errors, total),
            keyword_hit_rate: rate(keyword_scored.iter().filter(|h| **h).count(), keyword_scored.len()),
        }
    }
}

/// Output of one harness run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub mode: ResponseMode,
    pub metrics: Metrics,
    pub by_school: BTreeMap<String, Metrics>,
    /// Sorted by scenario id.
    pub results: Vec<ScenarioResult>,
}

impl EvaluationReport {
    pub fn from_results(mode: ResponseMode, mut results: Vec<ScenarioResult>) -> Self {
        results.sort_by(|a, b| a.id.cmp(&b.id));

        let mut grouped: BTreeMap<String, Vec<&ScenarioResult>> = BTreeMap::new();
        for r in &results {
            grouped.entry(r.school_id.clone()).or_default().push(r);
        }
        let by_school = grouped
            .into_iter()
            .map(|(school, rs)| (school, Metrics::compute(rs)))
            .collect();

        Self {
            mode,
            metrics: Metrics::compute(&results),
            by_school,
            results,
        }
    }

    /// Write the report as pretty JSON to `dir/evaluation_<stamp>.json`.
    pub fn write_json(&self, dir: &Path, stamp: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create report directory: {}", dir.display()))?;
        let path = dir.join(format!("evaluation_{}.json", stamp));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        Ok(path)
    }

    /// Human-readable summary table.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let m = &self.metrics;
        let mode = match self.mode {
            ResponseMode::Socratic => "socratic",
            ResponseMode::Direct => "direct",
        };
        out.push_str(&format!("Evaluation ({} mode)\n", mode));
        out.push_str("================================\n\n");
        out.push_str(&format!(
            "  Scenarios:         {} ({} passed, {} wrong, {} errors)\n",
            m.total, m.passed, m.wrong_answers, m.errors
        ));
        out.push_str(&format!("  Overall accuracy:  {}\n", pct(m.overall_accuracy)));
        out.push_str(&format!("  In-scope accuracy: {}\n", pct(m.in_scope_accuracy)));
        out.push_str(&format!("  Refusal accuracy:  {}\n", pct(m.refusal_accuracy)));
        out.push_str(&format!("  Citation rate:     {}\n", pct(m.citation_rate)));
        out.push_str(&format!("  Socratic rate:     {}\n", pct(m.socratic_rate)));
        out.push_str(&format!("  Keyword hit rate:  {}\n", pct(m.keyword_hit_rate)));
        out.push_str(&format!("  Mean confidence:   {:.3}\n", m.mean_confidence));
        out.push_str(&format!("  Mean latency:      {:.0} ms\n", m.mean_latency_ms));

        if !self.by_school.is_empty() {
            out.push_str("\n  By school:\n");
            out.push_str(&format!(
                "  {:<16} {:>5} {:>9} {:>9} {:>9} {:>9} {:>7}\n",
                "SCHOOL", "N", "OVERALL", "IN-SCOPE", "REFUSAL", "SOCRATIC", "ERRORS"
            ));
            out.push_str(&format!("  {}\n", "-".repeat(70)));
            for (school, s) in &self.by_school {
                out.push_str(&format!(
                    "  {:<16} {:>5} {:>9} {:>9} {:>9} {:>9} {:>7}\n",
                    school,
                    s.total,
                    pct(s.overall_accuracy),
                    pct(s.in_scope_accuracy),
                    pct(s.refusal_accuracy),
                    pct(s.socratic_rate),
                    s.errors
                ));
            }
        }

        let errored: Vec<&ScenarioResult> = self.results.iter().filter(|r| r.is_error()).collect();
        if !errored.is_empty() {
            out.push_str("\n  Errors:\n");
            for r in errored {
                if let ScenarioOutcome::Errored { code, stage, .. } = &r.outcome {
                    out.push_str(&format!("    {}  {} at {}\n", r.id, code, stage));
                }
            }
        }
        out
    }
}

fn pct(v: f64) -> String {
    format!("{:.1}%", v * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, expected_in_scope: bool, refused: Option<bool>, citations: usize) -> ScenarioResult {
        let outcome = match refused {
            None => ScenarioOutcome::Errored {
                code: "embedding_service".into(),
                stage: "received".into(),
                message: "timeout".into(),
            },
            Some(r) if r == !expected_in_scope && (r || citations > 0) => ScenarioOutcome::Passed,
            Some(_) => ScenarioOutcome::WrongAnswer,
        };
        ScenarioResult {
            id: id.into(),
            school_id: "stoicism".into(),
            question: "q".into(),
            expected_in_scope,
            outcome,
            refused,
            citations,
            socratic: refused == Some(false),
            confidence: refused.map(|_| 0.5),
            keyword_hit: None,
            latency_ms: 10,
            response: None,
        }
    }

    #[test]
    fn test_metrics() {
        let results = vec![
            result("a", true, Some(false), 2),
            result("b", true, Some(true), 0),
            result("c", false, Some(true), 0),
            result("d", false, Some(false), 1),
            result("e", true, None, 0),
        ];
        let m = Metrics::compute(&results);
        assert_eq!(m.total, 5);
        assert_eq!(m.passed, 2);
        assert_eq!(m.errors, 1);
        assert_eq!(m.wrong_answers, 2);
        assert!((m.in_scope_accuracy - 1.0 / 3.0).abs() < 1e-9);
        assert!((m.refusal_accuracy - 0.5).abs() < 1e-9);
        assert_eq!(m.citation_rate, 1.0);
        assert_eq!(m.socratic_rate, 1.0);
        assert_eq!(m.error_rate, 0.2);
        assert_eq!(m.mean_latency_ms, 10.0);
        assert_eq!(m.keyword_hit_rate, 0.0);
    }

    #[test]
    fn test_empty_batch_is_all_zero() {
        let m = Metrics::compute(&Vec::new());
        assert_eq!(m.total, 0);
        assert_eq!(m.overall_accuracy, 0.0);
        assert_eq!(m.mean_latency_ms, 0.0);
    }

    #[test]
    fn test_report_sorted_and_written() {
        let report = EvaluationReport::from_results(
            ResponseMode::Socratic,
            vec![result("b", true, Some(false), 1), result("a", false, Some(true), 0)],
        );
        assert_eq!(report.results[0].id, "a");
        assert_eq!(report.by_school["stoicism"].total, 2);
        assert!(report.summary().contains("100.0%"));

        let tmp = tempfile::TempDir::new().unwrap();
        let path = report.write_json(tmp.path(), "20261018_120000").unwrap();
        assert!(path.ends_with("evaluation_20261018_120000.json"));
        let back: EvaluationReport =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back, report);
    }
}
