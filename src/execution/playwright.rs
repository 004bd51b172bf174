//! Playwright-backed artifact capture.
//!
//! Renders a small Node.js script per test and runs it with `node`. The
//! script navigates, writes the screenshot, DOM snapshot and console log
//! next to each other under the artifact prefix, and prints a single JSON
//! object describing what it wrote (including an `error` key on failure).

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::capture::{artifact_prefix, prefixed_path, ArtifactCapture};
use super::types::ArtifactSet;
use crate::error::CaptureError;

/// Browser engine used by the capture script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Configuration for [`PlaywrightCapture`].
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    /// Root directory for artifacts; runs get a subdirectory each.
    pub artifacts_dir: PathBuf,
    /// Page navigation timeout.
    pub navigation_timeout: Duration,
    /// Extra time allowed for browser start-up and teardown.
    pub process_grace: Duration,
    /// Node.js executable.
    pub node_binary: String,
    pub browser: Browser,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("reports/artifacts"),
            navigation_timeout: Duration::from_secs(15),
            process_grace: Duration::from_secs(30),
            node_binary: "node".to_string(),
            browser: Browser::Chromium,
        }
    }
}

/// Capture backend driving a headless browser through Playwright.
#[derive(Debug, Clone)]
pub struct PlaywrightCapture {
    config: PlaywrightConfig,
}

/// Output locations for one capture.
struct CapturePaths {
    screenshot: PathBuf,
    dom: PathBuf,
    logs: PathBuf,
}

impl PlaywrightCapture {
    pub fn new(config: PlaywrightConfig) -> Self {
        Self { config }
    }

    /// Renders the capture script for one navigation.
    fn build_script(&self, url: &str, paths: &CapturePaths) -> Result<String, CaptureError> {
        let js = |s: &str| serde_json::to_string(s);
        Ok(format!(
            r#"
const {{ {browser} }} = require('playwright');
const fs = require('fs');

(async () => {{
  const artifacts = {{}};
  const logs = [];
  let browser;
  try {{
    browser = await {browser}.launch({{ headless: true }});
    const page = await browser.newPage();
    page.on('console', (msg) => logs.push(msg.text()));
    await page.goto({url}, {{ timeout: {timeout_ms} }});
    await page.screenshot({{ path: {screenshot} }});
    artifacts.screenshot = {screenshot};
    fs.writeFileSync({dom}, await page.content(), 'utf-8');
    artifacts.dom_snapshot = {dom};
    fs.writeFileSync({logs}, logs.join('\n'), 'utf-8');
    artifacts.logs = {logs};
  }} catch (error) {{
    artifacts.error = String(error && error.message ? error.message : error);
  }} finally {{
    if (browser) {{
      await browser.close();
    }}
  }}
  console.log(JSON.stringify(artifacts));
}})();
"#,
            browser = self.config.browser.as_str(),
            url = js(url)?,
            timeout_ms = self.config.navigation_timeout.as_millis(),
            screenshot = js(&paths.screenshot.to_string_lossy())?,
            dom = js(&paths.dom.to_string_lossy())?,
            logs = js(&paths.logs.to_string_lossy())?,
        ))
    }

    async fn try_capture(
        &self,
        url: &str,
        run_id: &str,
        test_name: &str,
    ) -> Result<ArtifactSet, CaptureError> {
        let prefix = artifact_prefix(&self.config.artifacts_dir, run_id, test_name);
        if let Some(parent) = prefix.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let paths = CapturePaths {
            screenshot: prefixed_path(&prefix, "_screenshot.png"),
            dom: prefixed_path(&prefix, "_dom.html"),
            logs: prefixed_path(&prefix, "_logs.txt"),
        };
        let script = self.build_script(url, &paths)?;

        let mut child = Command::new(&self.config.node_binary)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CaptureError::RuntimeUnavailable(format!(
                    "failed to start '{}': {}",
                    self.config.node_binary, e
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(script.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let budget = self.config.navigation_timeout + self.config.process_grace;
        let output = tokio::time::timeout(budget, child.wait_with_output())
            .await
            .map_err(|_| CaptureError::Timeout {
                seconds: budget.as_secs(),
            })??;

        if !output.status.success() {
            return Err(CaptureError::ScriptFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_script_output(&stdout)
    }
}

/// Parses the last non-empty stdout line as the artifact map.
fn parse_script_output(stdout: &str) -> Result<ArtifactSet, CaptureError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| CaptureError::InvalidOutput("capture script printed nothing".to_string()))?;

    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(line)?;
    Ok(map
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect())
}

#[async_trait]
impl ArtifactCapture for PlaywrightCapture {
    async fn capture(&self, url: &str, run_id: &str, test_name: &str) -> ArtifactSet {
        match self.try_capture(url, run_id, test_name).await {
            Ok(artifacts) => {
                debug!(run_id, test_name, url, kinds = artifacts.len(), "Playwright capture finished");
                artifacts
            }
            Err(e) => {
                warn!(run_id, test_name, url, error = %e, "Playwright capture failed");
                ArtifactSet::error(e.to_string())
            }
        }
    }

    fn name(&self) -> &'static str {
        "playwright"
    }
}
