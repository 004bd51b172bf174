//! Plain HTTP artifact capture.
//!
//! Useful where no browser runtime is installed: the page body is stored as
//! the DOM snapshot and a small log records the response status. Non-2xx
//! responses are logged as `ERROR` lines so log inspection marks them failed.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::capture::{artifact_prefix, prefixed_path, ArtifactCapture};
use super::types::{ArtifactKind, ArtifactSet};
use crate::error::CaptureError;

/// Capture backend that fetches the target with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpCapture {
    client: Client,
    artifacts_dir: PathBuf,
    timeout: Duration,
}

impl HttpCapture {
    /// Creates a capture backend writing under `artifacts_dir`.
    pub fn new(artifacts_dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self, CaptureError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            artifacts_dir: artifacts_dir.into(),
            timeout,
        })
    }

    async fn try_capture(
        &self,
        url: &str,
        run_id: &str,
        test_name: &str,
    ) -> Result<ArtifactSet, CaptureError> {
        let url = normalize_url(url);
        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                CaptureError::Timeout {
                    seconds: self.timeout.as_secs(),
                }
            } else {
                CaptureError::NavigationFailed {
                    url: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let body = response.text().await?;

        let prefix = artifact_prefix(&self.artifacts_dir, run_id, test_name);
        if let Some(parent) = prefix.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let dom = prefixed_path(&prefix, "_dom.html");
        tokio::fs::write(&dom, body.as_bytes()).await?;

        let mut log = format!("GET {} -> {}\n", url, status);
        if !status.is_success() {
            log.push_str(&format!("ERROR: HTTP {}\n", status.as_u16()));
        }
        let logs = prefixed_path(&prefix, "_logs.txt");
        tokio::fs::write(&logs, log.as_bytes()).await?;

        Ok(ArtifactSet::new()
            .with(ArtifactKind::DomSnapshot, dom.to_string_lossy())
            .with(ArtifactKind::Logs, logs.to_string_lossy()))
    }
}

/// Prepends `http://` when the url carries no scheme.
fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

#[async_trait]
impl ArtifactCapture for HttpCapture {
    async fn capture(&self, url: &str, run_id: &str, test_name: &str) -> ArtifactSet {
        match self.try_capture(url, run_id, test_name).await {
            Ok(artifacts) => {
                debug!(run_id, test_name, url, "HTTP capture finished");
                artifacts
            }
            Err(e) => {
                warn!(run_id, test_name, url, error = %e, "HTTP capture failed");
                ArtifactSet::error(e.to_string())
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
