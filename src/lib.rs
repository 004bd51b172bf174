//! qa-forge: automated QA execution and verdict analysis for web applications.
//!
//! Candidate tests are planned and ranked, executed with bounded parallelism
//! while screenshots, DOM snapshots and console logs are captured, and turned
//! into a persisted report with pass/fail/flaky verdicts.

pub mod agents;
pub mod analysis;
pub mod cli;
pub mod error;
pub mod execution;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod storage;
pub mod utils;

pub use analysis::{Report, Summary, VerdictAnalyzer};
pub use error::{CaptureError, LlmError};
pub use execution::{ExecutionCoordinator, RawResult, TestCase, TestExecutor, Verdict};
pub use pipeline::{PipelineConfig, PipelineError, QaService};
pub use storage::{ReportLocator, ReportStore};
