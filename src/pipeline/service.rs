//! QA service: the operations exposed to the CLI and other callers.
//!
//! ```text
//! plan ──► rank ──► execute ──► analyze ──► report
//!                      │            │
//!                      ▼            ▼
//!              <run>_raw.json  <run>_report.json
//! ```

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use super::config::{CaptureBackend, ConfigError, PipelineConfig};
use crate::agents::{
    AgentError, CandidateGenerator, CandidateRanker, LlmDeepAnalysis, PlaceholderGenerator,
    PlannerAgent, PlannerConfig, RankerAgent, RankerConfig, TruncatingRanker,
};
use crate::analysis::{AnalysisError, DeepAnalysis, Report, VerdictAnalyzer};
use crate::error::CaptureError;
use crate::execution::{
    new_run_id, ArtifactCapture, ExecutionCoordinator, ExecutionError, ExecutionStats,
    HttpCapture, PlaywrightCapture, PlaywrightConfig, RawResult, TestCase, TestExecutor,
};
use crate::llm::LlmProvider;
use crate::metrics::PipelineMetrics;
use crate::storage::{ReportLocator, ReportStore, StoreError};

/// Errors surfaced by [`QaService`] operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Execution rejected: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Capture backend setup failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("Metrics setup failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl PipelineError {
    /// True when a requested run has no stored document.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PipelineError::Store(StoreError::NotFound(_))
                | PipelineError::Analysis(AnalysisError::Store(StoreError::NotFound(_)))
        )
    }
}

/// Result of [`QaService::execute`].
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub run_id: String,
    pub results: Vec<RawResult>,
}

/// Result of [`QaService::analyze`] and [`QaService::run`].
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub run_id: String,
    pub report_path: ReportLocator,
    pub report: Report,
}

/// Builds the capture backend selected by `config`.
pub fn capture_from_config(
    config: &PipelineConfig,
) -> Result<Arc<dyn ArtifactCapture>, PipelineError> {
    Ok(match config.capture_backend {
        CaptureBackend::Playwright => Arc::new(PlaywrightCapture::new(PlaywrightConfig {
            artifacts_dir: config.artifacts_dir.clone(),
            navigation_timeout: config.navigation_timeout,
            ..Default::default()
        })),
        CaptureBackend::Http => Arc::new(HttpCapture::new(
            config.artifacts_dir.clone(),
            config.navigation_timeout,
        )?),
    })
}

/// The QA pipeline as a set of operations.
pub struct QaService {
    config: PipelineConfig,
    generator: Arc<dyn CandidateGenerator>,
    ranker: Arc<dyn CandidateRanker>,
    collaborator: Option<Arc<dyn DeepAnalysis>>,
    coordinator: ExecutionCoordinator,
    analyzer: VerdictAnalyzer,
    store: ReportStore,
    metrics: PipelineMetrics,
}

impl std::fmt::Debug for QaService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QaService")
            .field("config", &self.config)
            .field("generator", &self.generator.name())
            .field("ranker", &self.ranker.name())
            .field("collaborator", &self.collaborator.as_ref().map(|c| c.name()))
            .finish_non_exhaustive()
    }
}

impl QaService {
    /// Creates a service without LLM support.
    ///
    /// Planning and ranking use the placeholder generator and truncating
    /// ranker; verdicts are never refined.
    pub fn new(
        config: PipelineConfig,
        capture: Arc<dyn ArtifactCapture>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let metrics = PipelineMetrics::new()?;
        let store = ReportStore::new(config.reports_dir.clone());

        let executor = TestExecutor::new(capture)
            .with_default_target_url(config.default_target_url.clone())
            .with_test_timeout(config.test_timeout);
        let coordinator = ExecutionCoordinator::new(executor).with_metrics(metrics.clone());
        let analyzer = build_analyzer(&config, &store, &metrics, None);

        Ok(Self {
            config,
            generator: Arc::new(PlaceholderGenerator),
            ranker: Arc::new(TruncatingRanker),
            collaborator: None,
            coordinator,
            analyzer,
            store,
            metrics,
        })
    }

    /// Creates a service whose capture backend follows `config`.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        let capture = capture_from_config(&config)?;
        Self::new(config, capture)
    }

    /// Uses `llm` for planning, ranking and (when enabled) deep analysis.
    pub fn with_llm(self, llm: Arc<dyn LlmProvider>) -> Self {
        let planner = PlannerAgent::new(
            Arc::clone(&llm),
            PlannerConfig::new()
                .with_model(self.config.model.clone())
                .with_temperature(self.config.planner_temperature),
        );
        let ranker = RankerAgent::new(
            Arc::clone(&llm),
            RankerConfig::default()
                .with_model(self.config.model.clone())
                .with_temperature(self.config.ranker_temperature),
        );
        let deep_analysis = self.config.enable_deep_analysis.then(|| {
            Arc::new(
                LlmDeepAnalysis::new(llm)
                    .with_model(self.config.model.clone())
                    .with_temperature(self.config.analyzer_temperature),
            ) as Arc<dyn DeepAnalysis>
        });

        let service = self
            .with_generator(Arc::new(planner))
            .with_ranker(Arc::new(ranker));
        match deep_analysis {
            Some(collaborator) => service.with_collaborator(collaborator),
            None => service,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn CandidateGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_ranker(mut self, ranker: Arc<dyn CandidateRanker>) -> Self {
        self.ranker = ranker;
        self
    }

    /// Enables verdict refinement through `collaborator`.
    pub fn with_collaborator(mut self, collaborator: Arc<dyn DeepAnalysis>) -> Self {
        self.analyzer = build_analyzer(
            &self.config,
            &self.store,
            &self.metrics,
            Some(Arc::clone(&collaborator)),
        );
        self.collaborator = Some(collaborator);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Execution counters accumulated by this service.
    pub fn execution_stats(&self) -> ExecutionStats {
        self.coordinator.stats()
    }

    /// Generates `n` candidate tests for `target_url` (or the configured default).
    pub async fn plan(
        &self,
        target_url: Option<&str>,
        seeds: &[String],
        n: usize,
    ) -> Result<Vec<TestCase>, PipelineError> {
        let target_url = target_url.unwrap_or(&self.config.default_target_url);
        Ok(self.generator.generate(target_url, seeds, n).await?)
    }

    /// Keeps the `top_k` most promising candidates.
    pub async fn rank(
        &self,
        candidates: Vec<TestCase>,
        top_k: usize,
    ) -> Result<Vec<TestCase>, PipelineError> {
        Ok(self.ranker.rank(candidates, top_k).await?)
    }

    /// Executes `tests` under a fresh run id and persists the raw results.
    ///
    /// `parallelism` defaults to the configured value.
    pub async fn execute(
        &self,
        tests: Vec<TestCase>,
        parallelism: Option<usize>,
    ) -> Result<ExecutionOutcome, PipelineError> {
        self.execute_as(&new_run_id(), tests, parallelism).await
    }

    /// Executes `tests` under a caller-chosen run id.
    pub async fn execute_as(
        &self,
        run_id: &str,
        tests: Vec<TestCase>,
        parallelism: Option<usize>,
    ) -> Result<ExecutionOutcome, PipelineError> {
        let parallelism = parallelism.unwrap_or(self.config.parallelism);
        let results = self.coordinator.execute(run_id, tests, parallelism).await?;
        self.store.write_raw(run_id, &results).await?;

        Ok(ExecutionOutcome {
            run_id: run_id.to_string(),
            results,
        })
    }

    /// Analyzes `results` of `run_id` and writes the report.
    pub async fn analyze(
        &self,
        run_id: &str,
        results: &[RawResult],
    ) -> Result<AnalysisOutcome, PipelineError> {
        let (report_path, report) = self.analyzer.analyze(run_id, results).await?;
        Ok(AnalysisOutcome {
            run_id: run_id.to_string(),
            report_path,
            report,
        })
    }

    /// Analyzes the raw results previously persisted for `run_id`.
    pub async fn analyze_run(&self, run_id: &str) -> Result<AnalysisOutcome, PipelineError> {
        let results = self.store.read_raw(run_id).await?;
        self.analyze(run_id, &results).await
    }

    /// Fetches the stored report of `run_id`.
    pub async fn report(&self, run_id: &str) -> Result<Report, PipelineError> {
        Ok(self.store.read(run_id).await?)
    }

    /// Executes and analyzes `tests` in one go.
    pub async fn run(
        &self,
        tests: Vec<TestCase>,
        parallelism: Option<usize>,
    ) -> Result<AnalysisOutcome, PipelineError> {
        let execution = self.execute(tests, parallelism).await?;
        let outcome = self.analyze(&execution.run_id, &execution.results).await?;

        info!(
            run_id = %outcome.run_id,
            total = outcome.report.summary.total,
            passed = outcome.report.summary.passed,
            failed = outcome.report.summary.failed,
            flaky = outcome.report.summary.flaky,
            "Run complete"
        );
        Ok(outcome)
    }
}

fn build_analyzer(
    config: &PipelineConfig,
    store: &ReportStore,
    metrics: &PipelineMetrics,
    collaborator: Option<Arc<dyn DeepAnalysis>>,
) -> VerdictAnalyzer {
    let analyzer = VerdictAnalyzer::new(store.clone())
        .with_collaborator_timeout(config.collaborator_timeout)
        .with_default_target_url(config.default_target_url.clone())
        .with_report_notes(config.report_notes.clone())
        .with_metrics(metrics.clone());
    match collaborator {
        Some(collaborator) => analyzer.with_collaborator(collaborator),
        None => analyzer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ArtifactKind, ArtifactSet};
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Writes a log file per test; names containing "bad" log an error.
    struct LogCapture {
        dir: std::path::PathBuf,
    }

    #[async_trait]
    impl ArtifactCapture for LogCapture {
        async fn capture(&self, _url: &str, run_id: &str, test_name: &str) -> ArtifactSet {
            let path = self.dir.join(format!("{}_{}_logs.txt", run_id, test_name));
            let content = if test_name.contains("bad") {
                "TypeError: boom\nERROR in bundle"
            } else {
                "ready"
            };
            match tokio::fs::write(&path, content).await {
                Ok(()) => ArtifactSet::new().with(ArtifactKind::Logs, path.to_string_lossy()),
                Err(e) => ArtifactSet::error(e.to_string()),
            }
        }

        fn name(&self) -> &'static str {
            "log"
        }
    }

    fn service(dir: &TempDir) -> QaService {
        let config = PipelineConfig::default()
            .with_reports_dir(dir.path().join("reports"))
            .with_artifacts_dir(dir.path().join("artifacts"));
        QaService::new(
            config,
            Arc::new(LogCapture {
                dir: dir.path().to_path_buf(),
            }),
        )
        .expect("service should build")
    }

    #[tokio::test]
    async fn test_plan_rank_run_report() {
        let dir = TempDir::new().expect("tempdir");
        let service = service(&dir);

        let candidates = service.plan(None, &[], 4).await.expect("plan");
        assert_eq!(candidates.len(), 4);
        assert_eq!(
            candidates[0].target_url.as_deref(),
            Some("http://localhost:8000")
        );

        let selected = service.rank(candidates, 2).await.expect("rank");
        assert_eq!(selected.len(), 2);

        let mut tests = selected;
        tests.push(TestCase::new("bad_one", "bad"));
        let outcome = service.run(tests, Some(2)).await.expect("run");

        assert_eq!(outcome.report.summary.total, 3);
        assert_eq!(outcome.report.summary.passed, 2);
        assert_eq!(outcome.report.summary.failed, 1);

        let fetched = service.report(&outcome.run_id).await.expect("report");
        assert_eq!(fetched, outcome.report);

        let raw = service.store().read_raw(&outcome.run_id).await.expect("raw");
        assert_eq!(raw.len(), 3);
        assert_eq!(service.execution_stats().submitted, 3);
    }

    #[tokio::test]
    async fn test_analyze_run_from_persisted_raw() {
        let dir = TempDir::new().expect("tempdir");
        let service = service(&dir);

        let execution = service
            .execute(vec![TestCase::new("a", "good")], None)
            .await
            .expect("execute");
        assert!(execution.run_id.starts_with("run_"));

        let outcome = service.analyze_run(&execution.run_id).await.expect("analyze");
        assert_eq!(outcome.report.summary.passed, 1);
    }

    #[tokio::test]
    async fn test_errors_surface() {
        let dir = TempDir::new().expect("tempdir");
        let service = service(&dir);

        let err = service.report("run_absent").await.unwrap_err();
        assert!(err.is_not_found());

        let err = service.analyze_run("run_absent").await.unwrap_err();
        assert!(err.is_not_found());

        let err = service
            .execute(vec![TestCase::new("a", "a")], Some(0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Execution(ExecutionError::InvalidParallelism)
        ));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig::default().with_parallelism(0);
        let err = QaService::new(config, Arc::new(LogCapture { dir: ".".into() })).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
