//! Analyzed results, run summaries and the report document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::{ArtifactSet, Verdict};

const NOTE_PASSED: &str = "Execution completed successfully.";
const NOTE_FAILED: &str = "Execution failed: see artifacts.";
const NOTE_FLAKY: &str = "Verdict unstable across executions: see artifacts.";
const NOTE_PENDING: &str = "Execution completed, verdict pending.";

/// Per-test note for a verdict.
pub fn note_for(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Passed => NOTE_PASSED,
        Verdict::Failed => NOTE_FAILED,
        Verdict::Flaky => NOTE_FLAKY,
        Verdict::Pending => NOTE_PENDING,
    }
}

/// How often a verdict was observed and whether it is considered stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reproducibility {
    pub repeats: u32,
    pub stable: bool,
}

impl Reproducibility {
    /// Metadata for a single observation of `verdict`.
    pub fn single(verdict: Verdict) -> Self {
        Self {
            repeats: 1,
            stable: verdict == Verdict::Passed,
        }
    }
}

/// A test result with a resolved verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedResult {
    pub test_id: String,
    pub name: String,
    pub verdict: Verdict,
    pub artifacts: ArtifactSet,
    pub target_url: String,
    pub reproducibility: Reproducibility,
    pub notes: String,
}

/// Verdict counts for a run.
///
/// Always derived with [`Summary::from_results`]; never edited in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub flaky: usize,
}

impl Summary {
    pub fn from_results(results: &[AnalyzedResult]) -> Self {
        let mut summary = Summary {
            total: results.len(),
            ..Default::default()
        };
        for result in results {
            match result.verdict {
                Verdict::Passed => summary.passed += 1,
                Verdict::Failed => summary.failed += 1,
                Verdict::Flaky => summary.flaky += 1,
                // Analyzed results never carry a pending verdict.
                Verdict::Pending => summary.failed += 1,
            }
        }
        summary
    }

    /// True when `passed + failed + flaky == total`.
    pub fn is_consistent(&self) -> bool {
        self.passed + self.failed + self.flaky == self.total
    }
}

/// The persisted report for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub summary: Summary,
    pub results: Vec<AnalyzedResult>,
    /// Artifacts keyed by test id.
    pub artifacts: BTreeMap<String, ArtifactSet>,
    pub notes: String,
}

impl Report {
    /// Assembles a report, deriving the summary and artifact map from `results`.
    pub fn new(run_id: impl Into<String>, results: Vec<AnalyzedResult>, notes: impl Into<String>) -> Self {
        let summary = Summary::from_results(&results);
        let artifacts = results
            .iter()
            .map(|r| (r.test_id.clone(), r.artifacts.clone()))
            .collect();

        Self {
            run_id: run_id.into(),
            timestamp: Utc::now(),
            summary,
            results,
            artifacts,
            notes: notes.into(),
        }
    }

    /// Looks up a result by test id.
    pub fn result(&self, test_id: &str) -> Option<&AnalyzedResult> {
        self.results.iter().find(|r| r.test_id == test_id)
    }
}
