//! Planner Agent: proposes candidate QA test cases for a web application.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::candidates::{parse_test_cases, CandidateGenerator};
use super::error::{AgentError, AgentResult};
use crate::execution::TestCase;
use crate::llm::{GenerationRequest, LlmProvider, Message};

/// System prompt for test planning.
const PLANNER_SYSTEM_PROMPT: &str = r#"You are an experienced QA test planner for web applications.

Your job is to propose realistic, structured test cases covering user onboarding,
authentication, core navigation, primary user flows, responsiveness and edge cases.

Output Format:
Respond with ONLY a JSON array. Each element MUST have:
- "id": short unique identifier (snake_case)
- "description": what the test verifies
- "steps": ordered list of steps a tester should follow
- "expected_result": the expected outcome if the site is working correctly

Do not include any text outside the JSON array."#;

/// User prompt template for test planning.
const PLANNER_USER_TEMPLATE: &str = r#"Target: {target_url}
Seeds (optional): {seeds}

Generate {n} unique test cases as a JSON array."#;

/// Configuration for the Planner Agent.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Model identifier; empty uses the provider default.
    pub model: String,
    /// Temperature for LLM generation.
    pub temperature: f64,
    /// Maximum tokens for LLM response.
    pub max_tokens: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.5,
            max_tokens: 4000,
        }
    }
}

impl PlannerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the temperature for LLM generation.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// LLM-backed candidate generator.
pub struct PlannerAgent {
    llm: Arc<dyn LlmProvider>,
    config: PlannerConfig,
}

impl std::fmt::Debug for PlannerAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannerAgent")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PlannerAgent {
    /// Agent name constant for identification.
    pub const AGENT_NAME: &'static str = "planner";

    pub fn new(llm: Arc<dyn LlmProvider>, config: PlannerConfig) -> Self {
        Self { llm, config }
    }

    fn build_prompt(&self, target_url: &str, seeds: &[String], n: usize) -> String {
        let seeds = if seeds.is_empty() {
            "none".to_string()
        } else {
            seeds.join("; ")
        };

        PLANNER_USER_TEMPLATE
            .replace("{target_url}", target_url)
            .replace("{seeds}", &seeds)
            .replace("{n}", &n.to_string())
    }
}

#[async_trait]
impl CandidateGenerator for PlannerAgent {
    async fn generate(
        &self,
        target_url: &str,
        seeds: &[String],
        n: usize,
    ) -> AgentResult<Vec<TestCase>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        info!(target_url, n, "Planner generating candidate test cases");

        let request = GenerationRequest::new(
            self.config.model.clone(),
            vec![
                Message::system(PLANNER_SYSTEM_PROMPT),
                Message::user(self.build_prompt(target_url, seeds, n)),
            ],
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = self.llm.generate(request).await?;
        let content = response
            .first_content()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AgentError::GenerationFailed("Empty LLM response".to_string()))?;

        let candidates = parse_test_cases(content)?;
        if candidates.len() != n {
            warn!(
                requested = n,
                received = candidates.len(),
                "Planner returned a different number of candidates"
            );
        }
        info!(count = candidates.len(), "Planner generated candidates");
        Ok(candidates)
    }

    fn name(&self) -> &'static str {
        Self::AGENT_NAME
    }
}
