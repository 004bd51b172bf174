//! Test execution layer.
//!
//! ```text
//! [TestCase] ──► ExecutionCoordinator ──► TestExecutor (×N, bounded) ──► ArtifactCapture
//!                        │
//!                        └──► [RawResult] (verdict = pending)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use qa_forge::execution::{ExecutionCoordinator, HttpCapture, TestCase, TestExecutor};
//!
//! let capture = Arc::new(HttpCapture::new("reports/artifacts", Duration::from_secs(15))?);
//! let coordinator = ExecutionCoordinator::new(TestExecutor::new(capture));
//! let results = coordinator
//!     .execute("run_1a2b3c4d", vec![TestCase::new("home", "Home page")], 3)
//!     .await?;
//! ```

pub mod capture;
pub mod coordinator;
pub mod executor;
pub mod http;
pub mod playwright;
pub mod types;

pub use capture::{safe_filename, ArtifactCapture};
pub use coordinator::{ExecutionCoordinator, ExecutionError, ExecutionStats};
pub use executor::{TestExecutor, DEFAULT_TARGET_URL};
pub use http::HttpCapture;
pub use playwright::{Browser, PlaywrightCapture, PlaywrightConfig};
pub use types::{
    new_run_id, validate_run_id, ArtifactKind, ArtifactSet, ExecutionStatus, RawResult,
    ResolvedTest, TestCase, Verdict,
};
