//! QA pipeline: configuration and the service tying the stages together.
//!
//! # Example
//!
//! ```rust,ignore
//! use qa_forge::pipeline::{PipelineConfig, QaService};
//!
//! let service = QaService::from_config(PipelineConfig::from_env()?)?;
//! let candidates = service.plan(Some("https://app.example"), &[], 10).await?;
//! let selected = service.rank(candidates, 5).await?;
//! let outcome = service.run(selected, None).await?;
//! println!("report written to {}", outcome.report_path);
//! ```

pub mod config;
pub mod service;

pub use config::{CaptureBackend, ConfigError, PipelineConfig};
pub use service::{
    capture_from_config, AnalysisOutcome, ExecutionOutcome, PipelineError, QaService,
};
