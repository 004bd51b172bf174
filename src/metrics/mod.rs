//! Prometheus metrics for the QA pipeline.
//!
//! Metrics live in a registry owned by [`PipelineMetrics`]; nothing is
//! registered globally. Build one per process (or per test) and hand clones
//! to the coordinator and analyzer.
//!
//! # Example
//!
//! ```
//! use qa_forge::metrics::PipelineMetrics;
//!
//! let metrics = PipelineMetrics::new().expect("metrics should register");
//! metrics.record_test("completed", 1.5);
//! assert!(metrics.export().contains("qa_forge_tests_total"));
//! ```

pub mod pipeline_metrics;

pub use pipeline_metrics::PipelineMetrics;
