//! Shared utility functions for qa-forge.
//!
//! Currently limited to JSON extraction from LLM responses, used by the
//! planner, ranker and deep-analysis agents.

pub mod json_extraction;

pub use json_extraction::{
    extract_json_from_response, try_extract_json_from_response, JsonExtractionError,
    JsonExtractionResult,
};
