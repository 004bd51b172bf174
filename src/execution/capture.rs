//! Artifact capture port.
//!
//! A capture backend navigates to a URL on behalf of one test and records
//! evidence (screenshot, DOM snapshot, console logs). Backends never fail
//! past this boundary: any internal error is folded into an `ArtifactSet`
//! holding only an `error` entry.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::types::ArtifactSet;

/// Port for artifact capture backends.
#[async_trait]
pub trait ArtifactCapture: Send + Sync {
    /// Captures artifacts for `test_name` of `run_id` against `url`.
    async fn capture(&self, url: &str, run_id: &str, test_name: &str) -> ArtifactSet;

    /// Short backend name used in logs.
    fn name(&self) -> &'static str;
}

/// Makes a test name safe for use as a path segment.
///
/// Every character outside `[A-Za-z0-9_-]` becomes `_`.
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Returns the per-test artifact prefix `<artifacts_dir>/<run_id>/<safe name>`.
///
/// Callers append `_screenshot.png`, `_dom.html`, `_logs.txt` and so on.
pub fn artifact_prefix(artifacts_dir: &Path, run_id: &str, test_name: &str) -> PathBuf {
    artifacts_dir
        .join(safe_filename(run_id))
        .join(safe_filename(test_name))
}

/// Appends `suffix` to the final component of `prefix`.
pub fn prefixed_path(prefix: &Path, suffix: &str) -> PathBuf {
    let mut os = prefix.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}
