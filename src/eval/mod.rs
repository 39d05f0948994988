//! Evaluation harness.
//!
//! Replays a [`ScenarioSet`] through the dialogue engine and scores the
//! observed behaviour. Scenarios run concurrently, bounded by a semaphore
//! so the generation service sees at most `concurrency` turns at once.
//! Results are keyed by scenario id and sorted before aggregation, so the
//! report does not depend on completion order; with a [`FixedClock`] and
//! deterministic providers two runs produce identical reports.
//!
//! A failed turn is recorded as [`ScenarioOutcome::Errored`], never as a
//! wrong answer: an unavailable service says nothing about scope quality.

mod report;
mod scenario;

pub use report::{EvaluationReport, Metrics, ScenarioOutcome, ScenarioResult};
pub use scenario::{builtin_scenarios, load_scenarios, EvaluationScenario, ScenarioSet};

use anyhow::{bail, Result};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use philosophy_rag_core::engine::{DialogueEngine, TurnError};
use philosophy_rag_core::models::{Response, ResponseMode};

use crate::app;
use crate::config::Config;

/// Millisecond time source for latency measurement.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Monotonic wall clock.
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Clock that never advances; every latency is zero.
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now_ms(&self) -> u64 {
        self.0
    }
}

pub struct EvaluationHarness {
    engine: Arc<DialogueEngine>,
    concurrency: usize,
    mode: ResponseMode,
    clock: Arc<dyn Clock>,
}

impl EvaluationHarness {
    pub fn new(engine: Arc<DialogueEngine>, concurrency: usize, mode: ResponseMode) -> Self {
        Self {
            engine,
            concurrency: concurrency.max(1),
            mode,
            clock: Arc::new(SystemClock::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run every scenario and aggregate the results.
    pub async fn run(&self, scenarios: &ScenarioSet) -> EvaluationReport {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (id, scenario) in scenarios {
            let engine = Arc::clone(&self.engine);
            let clock = Arc::clone(&self.clock);
            let semaphore = Arc::clone(&semaphore);
            let id = id.clone();
            let scenario = scenario.clone();
            let mode = self.mode;

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let start = clock.now_ms();
                let outcome = engine
                    .respond(&scenario.question, &scenario.school_id, mode)
                    .await;
                let latency_ms = clock.now_ms().saturating_sub(start);
                score(id, &scenario, outcome, latency_ms)
            });
        }

        let mut results = Vec::with_capacity(scenarios.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    tracing::debug!(
                        scenario = %result.id,
                        school = %result.school_id,
                        passed = result.outcome == ScenarioOutcome::Passed,
                        latency_ms = result.latency_ms,
                        "scenario finished"
                    );
                    results.push(result);
                }
                Err(e) => tracing::error!(error = %e, "scenario task failed"),
            }
        }

        // A task that panicked still gets a result, attributed by id.
        let finished: BTreeSet<String> = results.iter().map(|r| r.id.clone()).collect();
        for (id, scenario) in scenarios {
            if !finished.contains(id) {
                results.push(errored(id.clone(), scenario, "task_failed", "aborted", "scenario task panicked", 0));
            }
        }

        let report = EvaluationReport::from_results(self.mode, results);
        tracing::info!(
            total = report.metrics.total,
            passed = report.metrics.passed,
            errors = report.metrics.errors,
            overall_accuracy = report.metrics.overall_accuracy,
            "evaluation finished"
        );
        report
    }
}

fn score(
    id: String,
    scenario: &EvaluationScenario,
    outcome: Result<Response, TurnError>,
    latency_ms: u64,
) -> ScenarioResult {
    let response = match outcome {
        Ok(response) => response,
        Err(e) => {
            return errored(
                id,
                scenario,
                e.code(),
                &e.stage.to_string(),
                &e.source.to_string(),
                latency_ms,
            )
        }
    };

    let refusal_correct = response.refused != scenario.expected_in_scope;
    let grounded = response.refused || !response.citations.is_empty();
    let outcome = if refusal_correct && grounded {
        ScenarioOutcome::Passed
    } else {
        ScenarioOutcome::WrongAnswer
    };
    let keyword_hit = if response.refused {
        None
    } else {
        scenario.keyword_hit(&response.text)
    };

    ScenarioResult {
        id,
        school_id: scenario.school_id.clone(),
        question: scenario.question.clone(),
        expected_in_scope: scenario.expected_in_scope,
        outcome,
        refused: Some(response.refused),
        citations: response.citations.len(),
        socratic: response.socratic,
        confidence: Some(response.confidence),
        keyword_hit,
        latency_ms,
        response: Some(response.text),
    }
}

fn errored(
    id: String,
    scenario: &EvaluationScenario,
    code: &str,
    stage: &str,
    message: &str,
    latency_ms: u64,
) -> ScenarioResult {
    ScenarioResult {
        id,
        school_id: scenario.school_id.clone(),
        question: scenario.question.clone(),
        expected_in_scope: scenario.expected_in_scope,
        outcome: ScenarioOutcome::Errored {
            code: code.to_string(),
            stage: stage.to_string(),
            message: message.to_string(),
        },
        refused: None,
        citations: 0,
        socratic: false,
        confidence: None,
        keyword_hit: None,
        latency_ms,
        response: None,
    }
}

/// `philo eval`: load scenarios, run the harness, write and print the report.
pub async fn run_eval(
    config: &Config,
    scenarios_path: Option<&Path>,
    builtin: bool,
    out_dir: &Path,
    concurrency: Option<usize>,
    mode: Option<ResponseMode>,
) -> Result<EvaluationReport> {
    let scenarios = match (scenarios_path, builtin) {
        (Some(path), false) => load_scenarios(path)?,
        (None, true) => builtin_scenarios(config),
        (Some(_), true) => bail!("Use either --scenarios or --builtin, not both"),
        (None, false) => bail!("No scenarios given. Pass --scenarios <file> or --builtin"),
    };
    if scenarios.is_empty() {
        bail!("Scenario set is empty");
    }

    let app = app::bootstrap(config.clone()).await?;
    let harness = EvaluationHarness::new(
        Arc::clone(&app.engine),
        concurrency.unwrap_or(config.evaluation.concurrency),
        mode.unwrap_or(config.evaluation.mode),
    );
    let report = harness.run(&scenarios).await;

    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let path = report.write_json(out_dir, &stamp)?;
    print!("{}", report.summary());
    println!();
    println!("Report written to {}", path.display());

    app.store.close().await;
    Ok(report)
}
