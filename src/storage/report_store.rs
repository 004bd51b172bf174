//! File-backed report store.
//!
//! Layout under the reports directory:
//!
//! ```text
//! <reports_dir>/<run_id>_report.json   final Report
//! <reports_dir>/<run_id>_raw.json      RawResult array from execution
//! ```
//!
//! Writes go to a temporary sibling file first and are renamed into place,
//! so readers never observe a half-written document.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::analysis::Report;
use crate::execution::{validate_run_id, RawResult};

/// Errors that can occur during report storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No document is stored for the run id.
    #[error("Report not found for run: {0}")]
    NotFound(String),

    #[error("Invalid run id: {0}")]
    InvalidRunId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Stable reference to a persisted report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportLocator(PathBuf);

impl ReportLocator {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ReportLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Stores reports and raw results as JSON documents keyed by run id.
#[derive(Debug, Clone)]
pub struct ReportStore {
    reports_dir: PathBuf,
}

impl ReportStore {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
        }
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// Path of the report document for `run_id`.
    pub fn report_path(&self, run_id: &str) -> PathBuf {
        self.reports_dir.join(format!("{}_report.json", run_id))
    }

    /// Path of the raw result document for `run_id`.
    pub fn raw_path(&self, run_id: &str) -> PathBuf {
        self.reports_dir.join(format!("{}_raw.json", run_id))
    }

    /// Persists `report`, replacing any earlier report for the same run.
    pub async fn write(&self, report: &Report) -> Result<ReportLocator, StoreError> {
        check_run_id(&report.run_id)?;
        let path = self.report_path(&report.run_id);
        self.write_document(&path, report).await?;

        debug!(run_id = %report.run_id, path = %path.display(), "Report written");
        Ok(ReportLocator(path))
    }

    /// Loads the report for `run_id`.
    ///
    /// Absent reports yield [`StoreError::NotFound`]; nothing is created.
    pub async fn read(&self, run_id: &str) -> Result<Report, StoreError> {
        check_run_id(run_id)?;
        self.read_document(&self.report_path(run_id), run_id).await
    }

    /// Loads a report through a locator returned by [`ReportStore::write`].
    pub async fn read_locator(&self, locator: &ReportLocator) -> Result<Report, StoreError> {
        self.read_document(locator.path(), &locator.to_string())
            .await
    }

    /// Persists the raw execution results of `run_id`.
    pub async fn write_raw(
        &self,
        run_id: &str,
        results: &[RawResult],
    ) -> Result<PathBuf, StoreError> {
        check_run_id(run_id)?;
        let path = self.raw_path(run_id);
        self.write_document(&path, &results).await?;

        debug!(run_id, results = results.len(), "Raw results written");
        Ok(path)
    }

    /// Loads the raw execution results of `run_id`.
    pub async fn read_raw(&self, run_id: &str) -> Result<Vec<RawResult>, StoreError> {
        check_run_id(run_id)?;
        self.read_document(&self.raw_path(run_id), run_id).await
    }

    async fn write_document<T: Serialize + ?Sized>(
        &self,
        path: &Path,
        value: &T,
    ) -> Result<(), StoreError> {
        fs::create_dir_all(&self.reports_dir).await?;

        let json = serde_json::to_string_pretty(value)?;
        let tmp = temp_path(path);

        let written = match write_synced(&tmp, json.as_bytes()).await {
            Ok(()) => fs::rename(&tmp, path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp).await {
                debug!(path = %tmp.display(), error = %cleanup, "Temporary report not removed");
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn read_document<T: DeserializeOwned>(
        &self,
        path: &Path,
        run_id: &str,
    ) -> Result<T, StoreError> {
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(run_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&contents)?)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

fn check_run_id(run_id: &str) -> Result<(), StoreError> {
    validate_run_id(run_id).map_err(StoreError::InvalidRunId)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    PathBuf::from(os)
}
