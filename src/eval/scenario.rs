//! Labeled evaluation scenarios.
//!
//! A scenario set maps a scenario id to one question, the school it is
//! asked of, and whether the school should answer it. Sets are loaded from
//! JSON or TOML, or generated from the `evaluation_questions` of each
//! configured school.
//!
//! ```toml
//! [stoic-control]
//! question = "Làm thế nào để kiểm soát cảm xúc?"
//! school_id = "stoicism"
//! expected_in_scope = true
//! expected_keywords = ["kiểm soát", "cảm xúc"]
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScenario {
    pub question: String,
    #[serde(alias = "school")]
    pub school_id: String,
    pub expected_in_scope: bool,
    /// Terms an answer is expected to mention; scored separately from pass/fail.
    #[serde(default)]
    pub expected_keywords: Vec<String>,
}

impl EvaluationScenario {
    /// Whether `text` contains at least one expected keyword, ignoring case.
    /// `None` when the scenario lists no keywords.
    pub fn keyword_hit(&self, text: &str) -> Option<bool> {
        if self.expected_keywords.is_empty() {
            return None;
        }
        let lowered = text.to_lowercase();
        Some(
            self.expected_keywords
                .iter()
                .any(|k| lowered.contains(&k.to_lowercase())),
        )
    }
}

/// Scenario id to scenario, iterated in id order.
pub type ScenarioSet = BTreeMap<String, EvaluationScenario>;

/// Read a scenario set from a `.json` or `.toml` file.
pub fn load_scenarios(path: &Path) -> Result<ScenarioSet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file: {}", path.display()))?;

    let set: ScenarioSet = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse scenario file: {}", path.display()))?,
        Some("toml") => toml::from_str(&content)
            .with_context(|| format!("Failed to parse scenario file: {}", path.display()))?,
        _ => bail!(
            "Unsupported scenario file '{}': expected a .json or .toml extension",
            path.display()
        ),
    };

    for (id, scenario) in &set {
        if scenario.question.trim().is_empty() {
            bail!("scenario '{}' has an empty question", id);
        }
        if scenario.school_id.trim().is_empty() {
            bail!("scenario '{}' has an empty school_id", id);
        }
    }
    Ok(set)
}

/// Scenarios derived from the config: every school's evaluation questions
/// (expected in scope) plus the shared out-of-scope questions asked of
/// each school that has seed questions.
pub fn builtin_scenarios(config: &Config) -> ScenarioSet {
    let mut set = ScenarioSet::new();
    for school in &config.schools {
        if school.evaluation_questions.is_empty() {
            continue;
        }
        for (i, question) in school.evaluation_questions.iter().enumerate() {
            set.insert(
                format!("{}-in-{:02}", school.id, i + 1),
                EvaluationScenario {
                    question: question.clone(),
                    school_id: school.id.clone(),
                    expected_in_scope: true,
                    expected_keywords: vec![],
                },
            );
        }
        for (i, question) in config.evaluation.out_of_scope_questions.iter().enumerate() {
            set.insert(
                format!("{}-out-{:02}", school.id, i + 1),
                EvaluationScenario {
                    question: question.clone(),
                    school_id: school.id.clone(),
                    expected_in_scope: false,
                    expected_keywords: vec![],
                },
            );
        }
    }
    set
}
