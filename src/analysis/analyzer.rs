//! Verdict analyzer.
//!
//! Turns raw execution results into a persisted [`Report`]:
//!
//! 1. Pending verdicts are resolved from the captured console log.
//! 2. Reproducibility metadata and per-test notes are attached.
//! 3. An optional deep-analysis collaborator may refine the verdicts; any
//!    collaborator problem leaves the local results untouched.
//! 4. The summary is derived from the final result set and the report is
//!    written to the store.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::collaborator::{CollaboratorOutcome, DeepAnalysis, FallbackReason};
use super::types::{note_for, AnalyzedResult, Reproducibility, Report, Summary};
use crate::execution::types::placeholder_id;
use crate::execution::{validate_run_id, RawResult, Verdict, DEFAULT_TARGET_URL};
use crate::metrics::PipelineMetrics;
use crate::storage::{ReportLocator, ReportStore, StoreError};

/// Default bound on a deep-analysis call.
pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(60);

/// Notes written into reports when none are configured.
pub const DEFAULT_REPORT_NOTES: &str = "Generated by qa-forge verdict analyzer";

/// Artifact key some capture backends use to record the visited url.
const URL_ARTIFACT_KEY: &str = "url";

/// Errors surfaced to callers of [`VerdictAnalyzer::analyze`].
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid run id: {0}")]
    InvalidRunId(String),

    #[error("report storage failed: {0}")]
    Store(#[from] StoreError),
}

/// Resolves verdicts and writes the run report.
pub struct VerdictAnalyzer {
    store: ReportStore,
    collaborator: Option<Arc<dyn DeepAnalysis>>,
    collaborator_timeout: Duration,
    default_target_url: String,
    report_notes: String,
    metrics: Option<PipelineMetrics>,
}

impl std::fmt::Debug for VerdictAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerdictAnalyzer")
            .field("store", &self.store)
            .field(
                "collaborator",
                &self.collaborator.as_ref().map(|c| c.name()),
            )
            .field("collaborator_timeout", &self.collaborator_timeout)
            .finish_non_exhaustive()
    }
}

impl VerdictAnalyzer {
    pub fn new(store: ReportStore) -> Self {
        Self {
            store,
            collaborator: None,
            collaborator_timeout: DEFAULT_COLLABORATOR_TIMEOUT,
            default_target_url: DEFAULT_TARGET_URL.to_string(),
            report_notes: DEFAULT_REPORT_NOTES.to_string(),
            metrics: None,
        }
    }

    /// Enables verdict refinement through `collaborator`.
    pub fn with_collaborator(mut self, collaborator: Arc<dyn DeepAnalysis>) -> Self {
        self.collaborator = Some(collaborator);
        self
    }

    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self
    }

    pub fn with_default_target_url(mut self, url: impl Into<String>) -> Self {
        self.default_target_url = url.into();
        self
    }

    pub fn with_report_notes(mut self, notes: impl Into<String>) -> Self {
        self.report_notes = notes.into();
        self
    }

    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Analyzes `results` of `run_id`, persists the report and returns it.
    ///
    /// # Errors
    ///
    /// Only an invalid run id or a storage failure is reported; collaborator
    /// failures fall back to the local verdicts.
    pub async fn analyze(
        &self,
        run_id: &str,
        results: &[RawResult],
    ) -> Result<(ReportLocator, Report), AnalysisError> {
        validate_run_id(run_id).map_err(AnalysisError::InvalidRunId)?;
        info!(run_id, results = results.len(), "Analyzing results");

        let local = self.analyze_local(run_id, results).await;
        let analyzed = match self.collaborator {
            Some(ref collaborator) if !local.is_empty() => {
                self.refine(collaborator.as_ref(), run_id, local).await
            }
            _ => local,
        };

        let report = Report::new(run_id, analyzed, self.report_notes.clone());
        debug_assert!(report.summary.is_consistent());

        if let Some(ref metrics) = self.metrics {
            for result in &report.results {
                metrics.record_verdict(result.verdict.as_str());
            }
        }

        let locator = self.store.write(&report).await?;
        info!(
            run_id,
            total = report.summary.total,
            passed = report.summary.passed,
            failed = report.summary.failed,
            flaky = report.summary.flaky,
            report = %locator,
            "Report written"
        );

        Ok((locator, report))
    }

    /// Resolves every raw result locally, without the collaborator.
    pub async fn analyze_local(&self, run_id: &str, results: &[RawResult]) -> Vec<AnalyzedResult> {
        let mut analyzed = Vec::with_capacity(results.len());
        for raw in results {
            analyzed.push(self.analyze_one(run_id, raw).await);
        }
        analyzed
    }

    async fn analyze_one(&self, run_id: &str, raw: &RawResult) -> AnalyzedResult {
        let test_id = raw
            .test_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                let id = placeholder_id();
                warn!(run_id, test_id = %id, "Raw result without test id");
                id
            });
        let name = raw
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("test_{}", test_id));
        let target_url = raw
            .target_url
            .as_deref()
            .or_else(|| raw.artifacts.get_key(URL_ARTIFACT_KEY))
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(self.default_target_url.as_str())
            .to_string();

        let verdict = match raw.verdict {
            Verdict::Pending => resolve_from_logs(raw.artifacts.logs()).await,
            resolved => resolved,
        };
        debug!(run_id, test_id = %test_id, %verdict, "Verdict resolved");

        AnalyzedResult {
            test_id,
            name,
            verdict,
            artifacts: raw.artifacts.clone(),
            target_url,
            reproducibility: Reproducibility::single(verdict),
            notes: note_for(verdict).to_string(),
        }
    }

    async fn refine(
        &self,
        collaborator: &dyn DeepAnalysis,
        run_id: &str,
        local: Vec<AnalyzedResult>,
    ) -> Vec<AnalyzedResult> {
        let outcome =
            match tokio::time::timeout(self.collaborator_timeout, collaborator.refine(run_id, &local))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => CollaboratorOutcome::Unavailable(FallbackReason::Timeout(
                    self.collaborator_timeout,
                )),
            };

        let merged = match outcome {
            CollaboratorOutcome::Parsed(report) => report.merge_into(&local).map(|merged| {
                if let Some(claimed) = report.summary {
                    let actual = Summary::from_results(&merged);
                    if claimed != actual {
                        warn!(
                            run_id,
                            claimed = ?claimed,
                            actual = ?actual,
                            "Discarding collaborator summary that disagrees with its tests"
                        );
                    }
                }
                merged
            }),
            CollaboratorOutcome::Unavailable(reason) => Err(reason),
        };

        match merged {
            Ok(merged) => {
                info!(run_id, collaborator = collaborator.name(), "Adopted collaborator verdicts");
                merged
            }
            Err(reason) => {
                warn!(
                    run_id,
                    collaborator = collaborator.name(),
                    reason = %reason,
                    "Deep analysis unavailable, keeping local verdicts"
                );
                if let Some(ref metrics) = self.metrics {
                    metrics.record_fallback(reason.label());
                }
                local
            }
        }
    }
}

/// Resolves a pending verdict from the console log at `logs`.
///
/// A missing or unreadable log counts as a failure.
pub async fn resolve_from_logs(logs: Option<&str>) -> Verdict {
    let Some(path) = logs else {
        return Verdict::Failed;
    };
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            if String::from_utf8_lossy(&bytes).to_uppercase().contains("ERROR") {
                Verdict::Failed
            } else {
                Verdict::Passed
            }
        }
        Err(e) => {
            debug!(path, error = %e, "Log artifact unreadable");
            Verdict::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::collaborator::ParsedCollaboratorReport;
    use crate::execution::{ArtifactKind, ArtifactSet, ExecutionStatus};
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::TempDir;

    fn raw(id: &str, logs: Option<&Path>) -> RawResult {
        let artifacts = match logs {
            Some(path) => ArtifactSet::new().with(ArtifactKind::Logs, path.to_string_lossy()),
            None => ArtifactSet::new(),
        };
        RawResult {
            test_id: Some(id.to_string()),
            name: Some(format!("Test {}", id)),
            status: ExecutionStatus::Completed,
            verdict: Verdict::Pending,
            artifacts,
            target_url: Some("http://localhost:8000".to_string()),
        }
    }

    fn write_log(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).expect("write log");
        path
    }

    /// Returns a canned outcome, optionally after a delay.
    struct FixedCollaborator {
        outcome: CollaboratorOutcome,
        delay: Duration,
    }

    #[async_trait]
    impl DeepAnalysis for FixedCollaborator {
        async fn refine(&self, _run_id: &str, _analyzed: &[AnalyzedResult]) -> CollaboratorOutcome {
            tokio::time::sleep(self.delay).await;
            self.outcome.clone()
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_resolve_from_logs() {
        let dir = TempDir::new().expect("tempdir");
        let clean = write_log(&dir, "clean.txt", "page loaded\nall good\n");
        let error = write_log(&dir, "error.txt", "Uncaught error: x is undefined");

        assert_eq!(resolve_from_logs(clean.to_str()).await, Verdict::Passed);
        assert_eq!(resolve_from_logs(error.to_str()).await, Verdict::Failed);
        assert_eq!(resolve_from_logs(None).await, Verdict::Failed);
        assert_eq!(
            resolve_from_logs(Some("/definitely/not/here.txt")).await,
            Verdict::Failed
        );
    }

    #[tokio::test]
    async fn test_unreadable_log_fails() {
        let dir = TempDir::new().expect("tempdir");
        assert_eq!(resolve_from_logs(dir.path().to_str()).await, Verdict::Failed);

        let analyzer = VerdictAnalyzer::new(ReportStore::new(dir.path().join("reports")));
        let analyzed = analyzer
            .analyze_local("run_u", &[raw("d", Some(dir.path()))])
            .await;
        assert_eq!(analyzed[0].verdict, Verdict::Failed);
        assert_eq!(analyzed[0].notes, note_for(Verdict::Failed));
    }

    #[tokio::test]
    async fn test_local_analysis_notes_and_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let clean = write_log(&dir, "a.txt", "ok");
        let analyzer = VerdictAnalyzer::new(ReportStore::new(dir.path().join("reports")));

        let mut no_id = raw("ignored", None);
        no_id.test_id = None;
        no_id.name = None;
        no_id.target_url = None;
        no_id.verdict = Verdict::Flaky;

        let analyzed = analyzer
            .analyze_local("run_l", &[raw("a", Some(&clean)), no_id])
            .await;

        assert_eq!(analyzed[0].verdict, Verdict::Passed);
        assert_eq!(analyzed[0].notes, "Execution completed successfully.");
        assert!(analyzed[0].reproducibility.stable);

        assert!(analyzed[1].test_id.starts_with("placeholder_"));
        assert_eq!(analyzed[1].name, format!("test_{}", analyzed[1].test_id));
        assert_eq!(analyzed[1].target_url, DEFAULT_TARGET_URL);
        assert_eq!(analyzed[1].verdict, Verdict::Flaky);
        assert_eq!(analyzed[1].notes, note_for(Verdict::Flaky));
        assert!(!analyzed[1].reproducibility.stable);
    }

    #[tokio::test]
    async fn test_url_taken_from_artifacts() {
        let dir = TempDir::new().expect("tempdir");
        let analyzer = VerdictAnalyzer::new(ReportStore::new(dir.path()));

        let mut result = raw("a", None);
        result.target_url = None;
        result.artifacts = [("url".to_string(), "https://app.test/login".to_string())]
            .into_iter()
            .collect();

        let analyzed = analyzer.analyze_local("run_u", &[result]).await;
        assert_eq!(analyzed[0].target_url, "https://app.test/login");
        assert_eq!(analyzed[0].verdict, Verdict::Failed);
    }

    #[tokio::test]
    async fn test_analyze_writes_report() {
        let dir = TempDir::new().expect("tempdir");
        let clean = write_log(&dir, "a.txt", "ok");
        let store = ReportStore::new(dir.path().join("reports"));
        let metrics = PipelineMetrics::new().expect("metrics");
        let analyzer = VerdictAnalyzer::new(store.clone()).with_metrics(metrics.clone());

        let (locator, report) = analyzer
            .analyze("run_w", &[raw("a", Some(&clean)), raw("b", None)])
            .await
            .expect("analysis should succeed");

        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.passed, 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.artifacts.len(), 2);
        assert_eq!(store.read_locator(&locator).await.expect("stored"), report);
        assert_eq!(metrics.verdicts_total("passed"), 1);
        assert_eq!(metrics.verdicts_total("failed"), 1);
    }

    #[tokio::test]
    async fn test_collaborator_adopted() {
        let dir = TempDir::new().expect("tempdir");
        let clean = write_log(&dir, "a.txt", "ok");
        let report = ParsedCollaboratorReport::parse(
            r#"{"summary": {"total": 1, "passed": 1, "failed": 0, "flaky": 0},
                "tests": [{"test_id": "a", "verdict": "unsure"}]}"#,
        )
        .expect("parse");
        let analyzer = VerdictAnalyzer::new(ReportStore::new(dir.path())).with_collaborator(
            Arc::new(FixedCollaborator {
                outcome: CollaboratorOutcome::Parsed(report),
                delay: Duration::ZERO,
            }),
        );

        let (_, report) = analyzer
            .analyze("run_c", &[raw("a", Some(&clean))])
            .await
            .expect("analysis");

        assert_eq!(report.results[0].verdict, Verdict::Flaky);
        assert_eq!(report.summary.flaky, 1);
        assert_eq!(report.summary.passed, 0);
        assert!(report.summary.is_consistent());
    }

    #[tokio::test]
    async fn test_collaborator_timeout_falls_back() {
        let dir = TempDir::new().expect("tempdir");
        let clean = write_log(&dir, "a.txt", "ok");
        let metrics = PipelineMetrics::new().expect("metrics");
        let analyzer = VerdictAnalyzer::new(ReportStore::new(dir.path()))
            .with_collaborator(Arc::new(FixedCollaborator {
                outcome: CollaboratorOutcome::Unavailable(FallbackReason::EmptyResponse),
                delay: Duration::from_secs(10),
            }))
            .with_collaborator_timeout(Duration::from_millis(20))
            .with_metrics(metrics.clone());

        let (_, report) = analyzer
            .analyze("run_t", &[raw("a", Some(&clean))])
            .await
            .expect("analysis");

        assert_eq!(report.results[0].verdict, Verdict::Passed);
        assert_eq!(metrics.fallbacks_total("timeout"), 1);
    }

    #[tokio::test]
    async fn test_invalid_run_id() {
        let dir = TempDir::new().expect("tempdir");
        let analyzer = VerdictAnalyzer::new(ReportStore::new(dir.path()));
        assert!(matches!(
            analyzer.analyze(" ", &[]).await,
            Err(AnalysisError::InvalidRunId(_))
        ));
    }
}
