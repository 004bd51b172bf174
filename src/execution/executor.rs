//! Single-test executor.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::capture::ArtifactCapture;
use super::types::{ArtifactSet, RawResult, ResolvedTest, TestCase};

/// Fallback target when neither the test nor the configuration names one.
pub const DEFAULT_TARGET_URL: &str = "http://localhost:8000";

/// Runs one test case through a capture backend.
///
/// No retries: a test is captured exactly once.
#[derive(Clone)]
pub struct TestExecutor {
    capture: Arc<dyn ArtifactCapture>,
    default_target_url: String,
    test_timeout: Option<Duration>,
}

impl std::fmt::Debug for TestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestExecutor")
            .field("capture", &self.capture.name())
            .field("default_target_url", &self.default_target_url)
            .field("test_timeout", &self.test_timeout)
            .finish()
    }
}

impl TestExecutor {
    pub fn new(capture: Arc<dyn ArtifactCapture>) -> Self {
        Self {
            capture,
            default_target_url: DEFAULT_TARGET_URL.to_string(),
            test_timeout: None,
        }
    }

    /// Sets the target used by tests without one.
    pub fn with_default_target_url(mut self, url: impl Into<String>) -> Self {
        self.default_target_url = url.into();
        self
    }

    /// Bounds each test's capture; `None` waits indefinitely.
    pub fn with_test_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.test_timeout = timeout;
        self
    }

    pub fn default_target_url(&self) -> &str {
        &self.default_target_url
    }

    /// Resolves the test's defaults and executes it.
    pub async fn run(&self, test: &TestCase, run_id: &str) -> RawResult {
        let resolved = test.resolve(&self.default_target_url);
        self.run_resolved(&resolved, run_id).await
    }

    /// Executes an already resolved test.
    pub async fn run_resolved(&self, test: &ResolvedTest, run_id: &str) -> RawResult {
        debug!(
            run_id,
            test_id = %test.id,
            url = %test.target_url,
            backend = self.capture.name(),
            "Executing test"
        );

        let capture = self.capture.capture(&test.target_url, run_id, &test.name);
        let artifacts = match self.test_timeout {
            Some(limit) => match tokio::time::timeout(limit, capture).await {
                Ok(artifacts) => artifacts,
                Err(_) => {
                    warn!(
                        run_id,
                        test_id = %test.id,
                        timeout_secs = limit.as_secs_f64(),
                        "Test exceeded its deadline"
                    );
                    ArtifactSet::error(format!(
                        "Test timed out after {:.1} seconds",
                        limit.as_secs_f64()
                    ))
                }
            },
            None => capture.await,
        };

        if let Some(error) = artifacts.error_message() {
            warn!(run_id, test_id = %test.id, error, "Artifact capture reported an error");
        }

        RawResult::from_capture(test, artifacts)
    }
}
