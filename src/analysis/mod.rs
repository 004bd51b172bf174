//! Verdict analysis and report assembly.
//!
//! # Example
//!
//! ```rust,ignore
//! use qa_forge::analysis::VerdictAnalyzer;
//! use qa_forge::storage::ReportStore;
//!
//! let analyzer = VerdictAnalyzer::new(ReportStore::new("reports"));
//! let (locator, report) = analyzer.analyze("run_1a2b3c4d", &raw_results).await?;
//! println!("{} -> {:?}", locator, report.summary);
//! ```

pub mod analyzer;
pub mod collaborator;
pub mod types;

pub use analyzer::{
    resolve_from_logs, AnalysisError, VerdictAnalyzer, DEFAULT_COLLABORATOR_TIMEOUT,
    DEFAULT_REPORT_NOTES,
};
pub use collaborator::{
    CollaboratorOutcome, CollaboratorTest, DeepAnalysis, FallbackReason, ParsedCollaboratorReport,
};
pub use types::{note_for, AnalyzedResult, Reproducibility, Report, Summary};
