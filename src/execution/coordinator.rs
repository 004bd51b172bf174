//! Bounded execution coordinator.
//!
//! Fans a batch of tests out to spawned executor tasks. A semaphore sized by
//! the requested parallelism caps how many captures run at once; every test
//! yields exactly one `RawResult`, including tests whose task panicked.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use super::capture::safe_filename;
use super::executor::TestExecutor;
use super::types::{validate_run_id, ExecutionStatus, RawResult, ResolvedTest, TestCase};
use crate::metrics::PipelineMetrics;

/// Configuration errors rejected before any test is scheduled.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("parallelism must be at least 1")]
    InvalidParallelism,

    #[error("invalid run id: {0}")]
    InvalidRunId(String),

    #[error("duplicate test id '{0}' in batch")]
    DuplicateTestId(String),

    #[error("test names '{first}' and '{second}' share the artifact name '{artifact_name}'")]
    DuplicateArtifactName {
        first: String,
        second: String,
        artifact_name: String,
    },
}

/// Snapshot of the coordinator's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Tests accepted for execution.
    pub submitted: u64,
    /// Tests that finished with status `completed`.
    pub completed: u64,
    /// Tests that finished with status `failed`, crashes included.
    pub failed: u64,
    /// Tests currently holding an execution slot.
    pub active: u64,
    /// Highest `active` value observed.
    pub peak_active: u64,
}

impl ExecutionStats {
    /// Tests that produced a result.
    pub fn finished(&self) -> u64 {
        self.completed + self.failed
    }
}

struct SharedExecutionStats {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    active: AtomicU64,
    peak_active: AtomicU64,
}

impl SharedExecutionStats {
    fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            active: AtomicU64::new(0),
            peak_active: AtomicU64::new(0),
        }
    }

    fn record_submitted(&self, count: u64) {
        self.submitted.fetch_add(count, Ordering::SeqCst);
    }

    fn record_status(&self, status: ExecutionStatus) {
        match status {
            ExecutionStatus::Completed => self.completed.fetch_add(1, Ordering::SeqCst),
            ExecutionStatus::Failed => self.failed.fetch_add(1, Ordering::SeqCst),
        };
    }

    fn increment_active(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now, Ordering::SeqCst);
    }

    fn decrement_active(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> ExecutionStats {
        ExecutionStats {
            submitted: self.submitted.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            active: self.active.load(Ordering::SeqCst),
            peak_active: self.peak_active.load(Ordering::SeqCst),
        }
    }
}

/// Marks a test as active for as long as it is alive, panics included.
struct ActiveGuard {
    stats: Arc<SharedExecutionStats>,
    metrics: Option<PipelineMetrics>,
}

impl ActiveGuard {
    fn enter(stats: Arc<SharedExecutionStats>, metrics: Option<PipelineMetrics>) -> Self {
        stats.increment_active();
        if let Some(ref m) = metrics {
            m.test_started();
        }
        Self { stats, metrics }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.stats.decrement_active();
        if let Some(ref m) = self.metrics {
            m.test_finished();
        }
    }
}

/// Runs batches of tests with bounded parallelism.
pub struct ExecutionCoordinator {
    executor: TestExecutor,
    metrics: Option<PipelineMetrics>,
    stats: Arc<SharedExecutionStats>,
}

impl std::fmt::Debug for ExecutionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionCoordinator")
            .field("executor", &self.executor)
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

impl ExecutionCoordinator {
    pub fn new(executor: TestExecutor) -> Self {
        Self {
            executor,
            metrics: None,
            stats: Arc::new(SharedExecutionStats::new()),
        }
    }

    /// Records per-test metrics into `metrics`.
    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Counters accumulated over every batch run by this coordinator.
    pub fn stats(&self) -> ExecutionStats {
        self.stats.snapshot()
    }

    /// Executes `tests` with at most `parallelism` captures in flight.
    ///
    /// Returns one result per test, in no particular order.
    ///
    /// # Errors
    ///
    /// Rejects an invalid `run_id`, `parallelism == 0` and duplicate test ids
    /// before anything is scheduled.
    pub async fn execute(
        &self,
        run_id: &str,
        tests: Vec<TestCase>,
        parallelism: usize,
    ) -> Result<Vec<RawResult>, ExecutionError> {
        validate_run_id(run_id).map_err(ExecutionError::InvalidRunId)?;
        if parallelism == 0 {
            return Err(ExecutionError::InvalidParallelism);
        }
        if tests.is_empty() {
            debug!(run_id, "Empty batch, nothing to execute");
            return Ok(Vec::new());
        }

        let resolved = self.resolve_batch(&tests)?;
        self.stats.record_submitted(resolved.len() as u64);

        info!(
            run_id,
            tests = resolved.len(),
            parallelism,
            "Starting test execution"
        );

        let limiter = Arc::new(Semaphore::new(parallelism));
        let handles: Vec<_> = resolved
            .iter()
            .cloned()
            .map(|test| {
                let limiter = Arc::clone(&limiter);
                let executor = self.executor.clone();
                let stats = Arc::clone(&self.stats);
                let metrics = self.metrics.clone();
                let run_id = run_id.to_string();

                tokio::spawn(async move {
                    let _permit = match limiter.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            return RawResult::crashed(
                                &test,
                                format!("execution slot unavailable: {}", e),
                            )
                        }
                    };
                    let _active = ActiveGuard::enter(stats, metrics.clone());
                    let started = Instant::now();

                    let result = executor.run_resolved(&test, &run_id).await;

                    if let Some(m) = metrics {
                        m.record_test(
                            &result.status.to_string(),
                            started.elapsed().as_secs_f64(),
                        );
                    }
                    result
                })
            })
            .collect();

        let joined = futures::future::join_all(handles).await;

        let mut results = Vec::with_capacity(joined.len());
        for (test, outcome) in resolved.iter().zip(joined) {
            let result = match outcome {
                Ok(result) => result,
                Err(e) => {
                    error!(run_id, test_id = %test.id, error = %e, "Executor crashed");
                    if let Some(ref m) = self.metrics {
                        m.record_test(&ExecutionStatus::Failed.to_string(), 0.0);
                    }
                    RawResult::crashed(test, format!("executor crashed: {}", e))
                }
            };
            self.stats.record_status(result.status);
            results.push(result);
        }

        let stats = self.stats.snapshot();
        info!(
            run_id,
            results = results.len(),
            completed = results
                .iter()
                .filter(|r| r.status == ExecutionStatus::Completed)
                .count(),
            peak_active = stats.peak_active,
            "Test execution finished"
        );

        Ok(results)
    }

    /// Resolves identity defaults and rejects duplicate ids.
    ///
    /// Artifacts are keyed by the sanitized test name, so names that
    /// sanitize to the same segment are rejected as well.
    fn resolve_batch(&self, tests: &[TestCase]) -> Result<Vec<ResolvedTest>, ExecutionError> {
        let mut seen = HashSet::with_capacity(tests.len());
        let mut artifact_names: HashMap<String, String> = HashMap::with_capacity(tests.len());
        tests
            .iter()
            .map(|test| {
                let resolved = test.resolve(self.executor.default_target_url());
                if !seen.insert(resolved.id.clone()) {
                    return Err(ExecutionError::DuplicateTestId(resolved.id));
                }
                let artifact_name = safe_filename(&resolved.name);
                if let Some(first) = artifact_names.get(&artifact_name) {
                    return Err(ExecutionError::DuplicateArtifactName {
                        first: first.clone(),
                        second: resolved.name,
                        artifact_name,
                    });
                }
                artifact_names.insert(artifact_name, resolved.name.clone());
                Ok(resolved)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::capture::ArtifactCapture;
    use crate::execution::types::{ArtifactKind, ArtifactSet, Verdict};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Sleeps briefly and tracks how many captures overlap.
    #[derive(Default)]
    struct CountingCapture {
        current: AtomicU64,
        peak: AtomicU64,
    }

    #[async_trait]
    impl ArtifactCapture for CountingCapture {
        async fn capture(&self, _url: &str, _run_id: &str, test_name: &str) -> ArtifactSet {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            if test_name.contains("panic") {
                panic!("capture backend blew up");
            }
            if test_name.contains("broken") {
                return ArtifactSet::error("navigation failed");
            }
            ArtifactSet::new().with(ArtifactKind::Logs, format!("{}_logs.txt", test_name))
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn coordinator(capture: Arc<CountingCapture>) -> ExecutionCoordinator {
        ExecutionCoordinator::new(TestExecutor::new(capture))
    }

    fn batch(n: usize) -> Vec<TestCase> {
        (0..n)
            .map(|i| TestCase::new(format!("t{}", i), format!("test {}", i)))
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallelism_ceiling() {
        let capture = Arc::new(CountingCapture::default());
        let coordinator = coordinator(capture.clone());

        let results = coordinator
            .execute("run_ceiling", batch(12), 3)
            .await
            .expect("execution should succeed");

        assert_eq!(results.len(), 12);
        assert!(capture.peak.load(Ordering::SeqCst) <= 3);
        let stats = coordinator.stats();
        assert!(stats.peak_active <= 3);
        assert!(stats.peak_active >= 1);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.submitted, 12);
        assert_eq!(stats.finished(), 12);
    }

    #[tokio::test]
    async fn test_one_result_per_test() {
        let coordinator = coordinator(Arc::new(CountingCapture::default()));
        let mut tests = batch(4);
        tests.push(TestCase::new("bad", "broken page"));

        let results = coordinator
            .execute("run_ids", tests, 2)
            .await
            .expect("execution should succeed");

        let mut ids: Vec<_> = results.iter().filter_map(|r| r.test_id.clone()).collect();
        ids.sort();
        assert_eq!(ids, vec!["bad", "t0", "t1", "t2", "t3"]);
        assert!(results.iter().all(|r| r.verdict == Verdict::Pending));

        let bad = results
            .iter()
            .find(|r| r.test_id.as_deref() == Some("bad"))
            .expect("bad result present");
        assert_eq!(bad.status, ExecutionStatus::Failed);
        assert_eq!(coordinator.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_panicking_executor_is_isolated() {
        let coordinator = coordinator(Arc::new(CountingCapture::default()));
        let mut tests = batch(3);
        tests.push(TestCase::new("boom", "panic here"));

        let results = coordinator
            .execute("run_panic", tests, 2)
            .await
            .expect("execution should succeed");

        assert_eq!(results.len(), 4);
        let boom = results
            .iter()
            .find(|r| r.test_id.as_deref() == Some("boom"))
            .expect("crashed test still has a result");
        assert_eq!(boom.status, ExecutionStatus::Failed);
        assert!(boom.artifacts.has_error());
        assert_eq!(
            results
                .iter()
                .filter(|r| r.status == ExecutionStatus::Completed)
                .count(),
            3
        );
        assert_eq!(coordinator.stats().active, 0);
    }

    #[tokio::test]
    async fn test_configuration_errors() {
        let capture = Arc::new(CountingCapture::default());
        let coordinator = coordinator(capture.clone());

        assert_eq!(
            coordinator.execute("run_x", batch(2), 0).await,
            Err(ExecutionError::InvalidParallelism)
        );
        assert!(matches!(
            coordinator.execute("", batch(2), 1).await,
            Err(ExecutionError::InvalidRunId(_))
        ));
        assert!(matches!(
            coordinator.execute("../escape", batch(2), 1).await,
            Err(ExecutionError::InvalidRunId(_))
        ));

        let dupes = vec![TestCase::new("same", "a"), TestCase::new("same", "b")];
        assert_eq!(
            coordinator.execute("run_x", dupes, 1).await,
            Err(ExecutionError::DuplicateTestId("same".to_string()))
        );

        let colliding = vec![
            TestCase::new("ok", "Login flow"),
            TestCase::new("bad", "Login/flow"),
        ];
        assert_eq!(
            coordinator.execute("run_x", colliding, 2).await,
            Err(ExecutionError::DuplicateArtifactName {
                first: "Login flow".to_string(),
                second: "Login/flow".to_string(),
                artifact_name: "Login_flow".to_string(),
            })
        );

        assert_eq!(coordinator.stats().submitted, 0);
        assert_eq!(capture.peak.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let coordinator = coordinator(Arc::new(CountingCapture::default()));
        let results = coordinator
            .execute("run_empty", Vec::new(), 3)
            .await
            .expect("empty batch is valid");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_metrics_recorded() {
        let metrics = PipelineMetrics::new().expect("metrics");
        let coordinator =
            coordinator(Arc::new(CountingCapture::default())).with_metrics(metrics.clone());

        let mut tests = batch(2);
        tests.push(TestCase::new("bad", "broken"));
        coordinator
            .execute("run_metrics", tests, 3)
            .await
            .expect("execution should succeed");

        assert_eq!(metrics.tests_total("completed"), 2);
        assert_eq!(metrics.tests_total("failed"), 1);
        assert!(metrics.export().contains("qa_forge_tests_in_progress 0"));
    }
}
