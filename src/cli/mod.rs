//! Command-line interface for qa-forge.
//!
//! Provides commands for planning, ranking, executing and analyzing QA test
//! runs, and for reading stored reports.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
