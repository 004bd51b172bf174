//! Ranker Agent: selects the most valuable candidate test cases.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::candidates::{parse_test_cases, CandidateRanker};
use super::error::{AgentError, AgentResult};
use crate::execution::TestCase;
use crate::llm::{GenerationRequest, LlmProvider, Message};

const RANKER_SYSTEM_PROMPT: &str = r#"You are a QA strategist. Rank the given test cases by importance,
coverage, and likelihood of finding bugs. Keep every selected test case exactly as given,
including its "id".

Return ONLY a JSON array of test cases. No explanations, no text outside JSON."#;

const RANKER_USER_TEMPLATE: &str = r#"Here are the candidate test cases:
{candidates}

Select the top {top_k} most promising ones and return only them as JSON."#;

/// Configuration for the Ranker Agent.
#[derive(Debug, Clone)]
pub struct RankerConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.3,
            max_tokens: 4000,
        }
    }
}

impl RankerConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }
}

/// LLM-backed candidate ranker.
pub struct RankerAgent {
    llm: Arc<dyn LlmProvider>,
    config: RankerConfig,
}

impl std::fmt::Debug for RankerAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankerAgent")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RankerAgent {
    /// Agent name constant for identification.
    pub const AGENT_NAME: &'static str = "ranker";

    pub fn new(llm: Arc<dyn LlmProvider>, config: RankerConfig) -> Self {
        Self { llm, config }
    }
}

#[async_trait]
impl CandidateRanker for RankerAgent {
    async fn rank(&self, candidates: Vec<TestCase>, top_k: usize) -> AgentResult<Vec<TestCase>> {
        if candidates.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        info!(
            candidates = candidates.len(),
            top_k, "Ranker selecting candidates"
        );

        let prompt = RANKER_USER_TEMPLATE
            .replace("{candidates}", &serde_json::to_string_pretty(&candidates)?)
            .replace("{top_k}", &top_k.to_string());

        let request = GenerationRequest::new(
            self.config.model.clone(),
            vec![Message::system(RANKER_SYSTEM_PROMPT), Message::user(prompt)],
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = self.llm.generate(request).await?;
        let content = response
            .first_content()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AgentError::RankingFailed("LLM returned empty response".to_string()))?;

        let mut selected = parse_test_cases(content)?;
        if selected.len() > top_k {
            warn!(
                top_k,
                received = selected.len(),
                "Ranker returned more candidates than requested, truncating"
            );
            selected.truncate(top_k);
        }
        Ok(selected)
    }

    fn name(&self) -> &'static str {
        Self::AGENT_NAME
    }
}
