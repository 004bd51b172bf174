//! Candidate generation and ranking ports, plus the offline fallbacks.

use async_trait::async_trait;
use serde_json::Value;

use super::error::{AgentError, AgentResult};
use crate::execution::TestCase;
use crate::utils::try_extract_json_from_response;

/// Produces candidate test cases for a target application.
#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    async fn generate(
        &self,
        target_url: &str,
        seeds: &[String],
        n: usize,
    ) -> AgentResult<Vec<TestCase>>;

    fn name(&self) -> &'static str;
}

/// Selects the most promising candidates.
#[async_trait]
pub trait CandidateRanker: Send + Sync {
    async fn rank(&self, candidates: Vec<TestCase>, top_k: usize) -> AgentResult<Vec<TestCase>>;

    fn name(&self) -> &'static str;
}

/// Generator used when no LLM is configured.
///
/// Emits `cand_<i>` cases with generic steps so the rest of the pipeline can
/// still be exercised end to end.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderGenerator;

#[async_trait]
impl CandidateGenerator for PlaceholderGenerator {
    async fn generate(
        &self,
        target_url: &str,
        seeds: &[String],
        n: usize,
    ) -> AgentResult<Vec<TestCase>> {
        Ok((0..n)
            .map(|i| {
                let description = seeds
                    .get(i % seeds.len().max(1))
                    .cloned()
                    .unwrap_or_else(|| format!("Placeholder check {}", i));
                let mut case = TestCase::new(format!("cand_{}", i), format!("Candidate {}", i))
                    .with_target_url(target_url)
                    .with_steps(vec![
                        format!("Open {}", target_url),
                        "Wait for the page to finish loading".to_string(),
                    ])
                    .with_expected_result("Page loads without console errors");
                case.description = description;
                case
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "placeholder"
    }
}

/// Ranker used when no LLM is configured: keeps the first `top_k`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TruncatingRanker;

#[async_trait]
impl CandidateRanker for TruncatingRanker {
    async fn rank(&self, mut candidates: Vec<TestCase>, top_k: usize) -> AgentResult<Vec<TestCase>> {
        candidates.truncate(top_k);
        Ok(candidates)
    }

    fn name(&self) -> &'static str {
        "truncating"
    }
}

/// Parses test cases out of an LLM response.
///
/// Accepts a JSON array, a single object (wrapped into a list), or an object
/// holding the list under `tests` / `test_cases`.
pub fn parse_test_cases(content: &str) -> AgentResult<Vec<TestCase>> {
    let json = try_extract_json_from_response(content).into_result_with_context(content)?;
    let value: Value = serde_json::from_str(&json)
        .map_err(|e| AgentError::ResponseParseError(format!("Invalid JSON: {}", e)))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => {
            match object.remove("tests").or_else(|| object.remove("test_cases")) {
                Some(Value::Array(items)) => items,
                _ => vec![Value::Object(object)],
            }
        }
        other => {
            return Err(AgentError::ResponseParseError(format!(
                "Expected a list of test cases, got {}",
                other
            )))
        }
    };

    items
        .into_iter()
        .map(|item| serde_json::from_value::<TestCase>(item).map_err(AgentError::from))
        .collect()
}
