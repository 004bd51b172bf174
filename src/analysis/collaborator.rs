//! Deep-analysis collaborator port and payload handling.
//!
//! A collaborator (typically an LLM) may refine locally derived verdicts.
//! Its free-form output is parsed once into a [`CollaboratorOutcome`]; the
//! analyzer then either merges a [`ParsedCollaboratorReport`] into the local
//! results or keeps the local results and records the [`FallbackReason`].

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::types::{note_for, AnalyzedResult, Reproducibility, Summary};
use crate::execution::Verdict;
use crate::utils::{try_extract_json_from_response, JsonExtractionResult};

/// Port for optional verdict refinement.
#[async_trait]
pub trait DeepAnalysis: Send + Sync {
    /// Reviews locally analyzed results of `run_id`.
    async fn refine(&self, run_id: &str, analyzed: &[AnalyzedResult]) -> CollaboratorOutcome;

    fn name(&self) -> &'static str;
}

/// What the collaborator produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CollaboratorOutcome {
    Parsed(ParsedCollaboratorReport),
    Unavailable(FallbackReason),
}

impl CollaboratorOutcome {
    /// Parses a raw collaborator response.
    pub fn from_response(text: &str) -> Self {
        match ParsedCollaboratorReport::parse(text) {
            Ok(report) => CollaboratorOutcome::Parsed(report),
            Err(reason) => CollaboratorOutcome::Unavailable(reason),
        }
    }
}

/// Why the local report was kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// The collaborator did not answer within the configured bound.
    Timeout(Duration),
    /// The collaborator call itself failed.
    ProviderError(String),
    EmptyResponse,
    /// The response was not a JSON object of the expected shape.
    MalformedPayload(String),
    /// The response had no `tests` sequence.
    MissingTests,
    /// The collaborator's test ids differ from the local ones.
    IdMismatch { missing: Vec<String>, unexpected: Vec<String> },
}

impl FallbackReason {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            FallbackReason::Timeout(_) => "timeout",
            FallbackReason::ProviderError(_) => "provider_error",
            FallbackReason::EmptyResponse => "empty_response",
            FallbackReason::MalformedPayload(_) => "malformed_payload",
            FallbackReason::MissingTests => "missing_tests",
            FallbackReason::IdMismatch { .. } => "id_mismatch",
        }
    }
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackReason::Timeout(limit) => write!(
                f,
                "collaborator timed out after {:.1} seconds",
                limit.as_secs_f64()
            ),
            FallbackReason::ProviderError(e) => write!(f, "collaborator call failed: {}", e),
            FallbackReason::EmptyResponse => write!(f, "collaborator returned an empty response"),
            FallbackReason::MalformedPayload(e) => write!(f, "malformed collaborator payload: {}", e),
            FallbackReason::MissingTests => write!(f, "collaborator payload has no 'tests' list"),
            FallbackReason::IdMismatch {
                missing,
                unexpected,
            } => write!(
                f,
                "collaborator test ids differ (missing: [{}], unexpected: [{}])",
                missing.join(", "),
                unexpected.join(", ")
            ),
        }
    }
}

/// One test entry proposed by the collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct CollaboratorTest {
    pub test_id: String,
    /// Raw verdict string, if the collaborator gave one.
    pub verdict: Option<String>,
    pub notes: Option<String>,
    pub reproducibility: Option<Reproducibility>,
}

impl CollaboratorTest {
    /// The proposed verdict; anything unrecognised counts as `flaky`.
    pub fn resolved_verdict(&self) -> Option<Verdict> {
        self.verdict
            .as_deref()
            .map(|v| Verdict::parse_resolved(v).unwrap_or(Verdict::Flaky))
    }
}

/// A structurally valid collaborator payload, not yet checked against the
/// local results.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCollaboratorReport {
    pub tests: Vec<CollaboratorTest>,
    pub summary: Option<Summary>,
}

#[derive(Deserialize)]
struct WireTest {
    #[serde(default, deserialize_with = "crate::execution::types::lenient_id")]
    test_id: Option<String>,
    #[serde(default)]
    verdict: Option<Value>,
    #[serde(default)]
    notes: Option<Value>,
    #[serde(default)]
    reproducibility: Option<Value>,
}

impl ParsedCollaboratorReport {
    /// Extracts and validates the JSON payload in `text`.
    pub fn parse(text: &str) -> Result<Self, FallbackReason> {
        if text.trim().is_empty() {
            return Err(FallbackReason::EmptyResponse);
        }

        let json = match try_extract_json_from_response(text) {
            JsonExtractionResult::Success(json) => json,
            other => {
                return Err(FallbackReason::MalformedPayload(
                    other
                        .into_result_with_context(text)
                        .err()
                        .map(|e| e.to_string())
                        .unwrap_or_default(),
                ))
            }
        };

        let value: Value = serde_json::from_str(&json)
            .map_err(|e| FallbackReason::MalformedPayload(e.to_string()))?;
        let Value::Object(mut object) = value else {
            return Err(FallbackReason::MalformedPayload(
                "top-level value is not an object".to_string(),
            ));
        };

        let tests = match object.remove("tests") {
            Some(Value::Array(tests)) => tests,
            Some(_) => {
                return Err(FallbackReason::MalformedPayload(
                    "'tests' is not a list".to_string(),
                ))
            }
            None => return Err(FallbackReason::MissingTests),
        };

        let tests = tests
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                let wire: WireTest = serde_json::from_value(entry).map_err(|e| {
                    FallbackReason::MalformedPayload(format!("tests[{}]: {}", i, e))
                })?;
                let test_id = wire.test_id.ok_or_else(|| {
                    FallbackReason::MalformedPayload(format!("tests[{}] has no test_id", i))
                })?;

                Ok(CollaboratorTest {
                    test_id,
                    verdict: wire.verdict.map(value_to_string),
                    notes: wire
                        .notes
                        .map(value_to_string)
                        .filter(|n| !n.trim().is_empty()),
                    reproducibility: wire
                        .reproducibility
                        .and_then(|r| serde_json::from_value::<Reproducibility>(r).ok())
                        .filter(|r| r.repeats >= 1),
                })
            })
            .collect::<Result<Vec<_>, FallbackReason>>()?;

        let summary = object
            .remove("summary")
            .and_then(|s| serde_json::from_value::<Summary>(s).ok());

        Ok(Self { tests, summary })
    }

    /// Applies the collaborator's verdicts to `local`.
    ///
    /// Adopted only when the collaborator covers exactly the local test ids.
    /// Artifacts, names and target urls always stay local.
    pub fn merge_into(&self, local: &[AnalyzedResult]) -> Result<Vec<AnalyzedResult>, FallbackReason> {
        let local_ids: HashSet<&str> = local.iter().map(|r| r.test_id.as_str()).collect();
        let mut by_id: HashMap<&str, &CollaboratorTest> = HashMap::with_capacity(self.tests.len());
        let mut duplicated = Vec::new();
        for test in &self.tests {
            if by_id.insert(test.test_id.as_str(), test).is_some() {
                duplicated.push(test.test_id.clone());
            }
        }

        let mut missing: Vec<String> = local_ids
            .iter()
            .filter(|id| !by_id.contains_key(*id))
            .map(|id| id.to_string())
            .collect();
        let mut unexpected: Vec<String> = by_id
            .keys()
            .filter(|id| !local_ids.contains(*id))
            .map(|id| id.to_string())
            .chain(duplicated)
            .collect();

        if !missing.is_empty() || !unexpected.is_empty() {
            missing.sort();
            unexpected.sort();
            return Err(FallbackReason::IdMismatch {
                missing,
                unexpected,
            });
        }

        Ok(local
            .iter()
            .map(|result| {
                let Some(proposal) = by_id.get(result.test_id.as_str()) else {
                    return result.clone();
                };
                let verdict = proposal.resolved_verdict().unwrap_or(result.verdict);
                let reproducibility = proposal
                    .reproducibility
                    .unwrap_or_else(|| Reproducibility::single(verdict));

                // A local note only describes the local verdict.
                let notes = match proposal.notes.clone() {
                    Some(notes) => notes,
                    None if verdict == result.verdict => result.notes.clone(),
                    None => note_for(verdict).to_string(),
                };

                AnalyzedResult {
                    verdict,
                    reproducibility,
                    notes,
                    ..result.clone()
                }
            })
            .collect())
    }
}

fn value_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
