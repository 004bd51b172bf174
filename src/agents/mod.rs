//! Agents for test planning, ranking and deep result analysis.

pub mod candidates;
pub mod deep_analysis_agent;
pub mod error;
pub mod planner_agent;
pub mod ranker_agent;

pub use candidates::{
    parse_test_cases, CandidateGenerator, CandidateRanker, PlaceholderGenerator, TruncatingRanker,
};
pub use deep_analysis_agent::LlmDeepAnalysis;
pub use error::{AgentError, AgentResult};
pub use planner_agent::{PlannerAgent, PlannerConfig};
pub use ranker_agent::{RankerAgent, RankerConfig};
