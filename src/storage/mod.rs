//! Persistent storage for run reports.
//!
//! Reports and raw execution results are JSON documents under a reports
//! directory, keyed by run id.
//!
//! # Usage
//!
//! ```rust,ignore
//! use qa_forge::storage::ReportStore;
//!
//! let store = ReportStore::new("reports");
//! let locator = store.write(&report).await?;
//! let loaded = store.read(&report.run_id).await?;
//! ```

pub mod report_store;

pub use report_store::{ReportLocator, ReportStore, StoreError};
