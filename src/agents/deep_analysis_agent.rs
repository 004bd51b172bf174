//! LLM-backed deep analysis of executed tests.
//!
//! Sends the locally analyzed results to the model and asks for a structured
//! review. The response is handed back as a [`CollaboratorOutcome`]; whether
//! it is adopted is decided by the verdict analyzer.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::analysis::{AnalyzedResult, CollaboratorOutcome, DeepAnalysis, FallbackReason};
use crate::llm::{GenerationRequest, LlmProvider, Message};

const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are a QA report analyzer.

You receive execution results of automated browser tests. Validate each verdict,
assess reproducibility, and identify likely causes of failure.

Output Format:
Respond with ONLY a JSON object:
{
  "summary": {"total": <int>, "passed": <int>, "failed": <int>, "flaky": <int>},
  "tests": [
    {"test_id": "<id exactly as given>", "verdict": "passed|failed|flaky",
     "reproducibility": {"repeats": <int>, "stable": <bool>}, "notes": "<short explanation>"}
  ]
}

Include every test_id exactly once. Do not add or rename tests."#;

/// The subset of a result the model gets to see.
#[derive(Serialize)]
struct ReviewItem<'a> {
    test_id: &'a str,
    name: &'a str,
    verdict: &'a str,
    target_url: &'a str,
    artifacts: Vec<&'a str>,
    capture_error: Option<&'a str>,
    notes: &'a str,
}

/// Deep analysis through an [`LlmProvider`].
pub struct LlmDeepAnalysis {
    llm: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl std::fmt::Debug for LlmDeepAnalysis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmDeepAnalysis")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

impl LlmDeepAnalysis {
    /// Agent name constant for identification.
    pub const AGENT_NAME: &'static str = "deep_analysis";

    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            model: String::new(),
            temperature: 0.2,
            max_tokens: 4000,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    fn build_prompt(run_id: &str, analyzed: &[AnalyzedResult]) -> Result<String, serde_json::Error> {
        let items: Vec<ReviewItem<'_>> = analyzed
            .iter()
            .map(|r| ReviewItem {
                test_id: &r.test_id,
                name: &r.name,
                verdict: r.verdict.as_str(),
                target_url: &r.target_url,
                artifacts: r.artifacts.iter().map(|(kind, _)| kind).collect(),
                capture_error: r.artifacts.error_message(),
                notes: &r.notes,
            })
            .collect();

        Ok(format!(
            "Run: {}\n\nHere are the execution results:\n{}",
            run_id,
            serde_json::to_string_pretty(&items)?
        ))
    }
}

#[async_trait]
impl DeepAnalysis for LlmDeepAnalysis {
    async fn refine(&self, run_id: &str, analyzed: &[AnalyzedResult]) -> CollaboratorOutcome {
        let prompt = match Self::build_prompt(run_id, analyzed) {
            Ok(prompt) => prompt,
            Err(e) => return CollaboratorOutcome::Unavailable(FallbackReason::ProviderError(e.to_string())),
        };

        let request = GenerationRequest::new(
            self.model.clone(),
            vec![Message::system(ANALYSIS_SYSTEM_PROMPT), Message::user(prompt)],
        )
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens);

        let response = match self.llm.generate(request).await {
            Ok(response) => response,
            Err(e) => return CollaboratorOutcome::Unavailable(FallbackReason::ProviderError(e.to_string())),
        };

        let content = response.first_content().unwrap_or_default();
        debug!(run_id, chars = content.len(), "Deep analysis response received");
        CollaboratorOutcome::from_response(content)
    }

    fn name(&self) -> &'static str {
        Self::AGENT_NAME
    }
}
