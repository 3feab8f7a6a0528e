//! Outcomes and their aggregation.
//!
//! Reports are immutable values produced by pure folds over outcomes. Their
//! fields are private so the derived counters cannot drift from the
//! outcomes they summarize.

use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::adapter::StageResult;
use crate::errors::Result;
use crate::fixture::Fixture;
use crate::stage::Stage;

// =============================================================================
// OUTCOMES
// =============================================================================

/// Final state of one fixture run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    /// The stage produced a well-formed result that does not match.
    Failed,
    /// The harness could not obtain a result (adapter fault, timeout).
    Errored,
}

/// The recorded result of running one fixture once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    fixture: Arc<Fixture>,
    verdict: Verdict,
    actual: Option<StageResult>,
    message: String,
}

impl Outcome {
    pub fn pass(fixture: Arc<Fixture>, actual: StageResult) -> Self {
        Self {
            fixture,
            verdict: Verdict::Passed,
            actual: Some(actual),
            message: String::new(),
        }
    }

    pub fn fail(fixture: Arc<Fixture>, actual: StageResult, message: impl Into<String>) -> Self {
        Self {
            fixture,
            verdict: Verdict::Failed,
            actual: Some(actual),
            message: message.into(),
        }
    }

    pub fn error(fixture: Arc<Fixture>, actual: Option<StageResult>, message: impl Into<String>) -> Self {
        Self {
            fixture,
            verdict: Verdict::Errored,
            actual,
            message: message.into(),
        }
    }

    pub fn fixture(&self) -> &Fixture {
        &self.fixture
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }

    pub fn actual(&self) -> Option<&StageResult> {
        self.actual.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

// =============================================================================
// STAGE REPORTS
// =============================================================================

/// Ordered outcomes of one stage plus derived counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    stage: Stage,
    passed_count: usize,
    total: usize,
    pass_rate: f64,
    /// Fixtures never started because the run was cancelled.
    not_run: usize,
    outcomes: Vec<Outcome>,
}

impl StageReport {
    pub fn from_outcomes(stage: Stage, outcomes: Vec<Outcome>) -> Self {
        Self::partial(stage, outcomes, 0)
    }

    /// A report for a stage of which `not_run` fixtures were never started.
    pub fn partial(stage: Stage, outcomes: Vec<Outcome>, not_run: usize) -> Self {
        let passed_count = outcomes.iter().filter(|o| o.passed()).count();
        let total = outcomes.len();
        Self {
            stage,
            passed_count,
            total,
            pass_rate: rate(passed_count, total),
            not_run,
            outcomes,
        }
    }

    pub fn empty(stage: Stage) -> Self {
        Self::from_outcomes(stage, Vec::new())
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn passed_count(&self) -> usize {
        self.passed_count
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn failed_count(&self) -> usize {
        self.count(Verdict::Failed)
    }

    pub fn errored_count(&self) -> usize {
        self.count(Verdict::Errored)
    }

    /// `passed_count / total`, or 0.0 for an empty stage.
    pub fn pass_rate(&self) -> f64 {
        self.pass_rate
    }

    pub fn not_run(&self) -> usize {
        self.not_run
    }

    fn count(&self, verdict: Verdict) -> usize {
        self.outcomes.iter().filter(|o| o.verdict() == verdict).count()
    }
}

// =============================================================================
// SUITE REPORT
// =============================================================================

/// Stage-partitioned, aggregated result of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteReport {
    complete: bool,
    total_passed: usize,
    total_count: usize,
    pass_rate: f64,
    stages: Vec<StageReport>,
}

impl SuiteReport {
    /// Folds stage reports into a suite report.
    ///
    /// Stages are placed in declaration order whatever order they arrive
    /// in; stages without a report get an empty one. A later report for the
    /// same stage replaces an earlier one. The report is complete when no
    /// stage has fixtures left unrun.
    pub fn from_stage_reports(reports: impl IntoIterator<Item = StageReport>) -> Self {
        let mut slots: [Option<StageReport>; 5] = Default::default();
        for report in reports {
            let index = report.stage().index();
            slots[index] = Some(report);
        }
        let stages: Vec<StageReport> = Stage::ALL
            .into_iter()
            .zip(slots)
            .map(|(stage, slot)| slot.unwrap_or_else(|| StageReport::empty(stage)))
            .collect();

        let total_passed = stages.iter().map(StageReport::passed_count).sum();
        let total_count = stages.iter().map(StageReport::total).sum();
        let complete = stages.iter().all(|s| s.not_run() == 0);
        Self {
            complete,
            total_passed,
            total_count,
            pass_rate: rate(total_passed, total_count),
            stages,
        }
    }

    pub fn stages(&self) -> &[StageReport] {
        &self.stages
    }

    pub fn stage(&self, stage: Stage) -> &StageReport {
        &self.stages[stage.index()]
    }

    pub fn total_passed(&self) -> usize {
        self.total_passed
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn pass_rate(&self) -> f64 {
        self.pass_rate
    }

    /// False when the run was cancelled before every fixture ran.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn all_passed(&self) -> bool {
        self.complete && self.total_passed == self.total_count
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// SHA-256 of the canonical JSON form; equal reports have equal fingerprints.
    pub fn fingerprint(&self) -> Result<String> {
        let canonical = serde_json::to_vec(self)?;
        let digest = Sha256::digest(&canonical);
        Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }
}

fn rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64
    }
}
