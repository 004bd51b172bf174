//! LLM integration for qa-forge.
//!
//! The planner, ranker and deep-analysis agents talk to an
//! OpenAI-compatible chat completion endpoint through the `LlmProvider`
//! trait.
//!
//! ```ignore
//! use qa_forge::llm::{LiteLlmClient, LlmProvider, GenerationRequest, Message};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new("", vec![Message::user("Hello")]);
//! let response = client.generate(request).await?;
//! ```

pub mod litellm;

pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
    DEFAULT_MODEL, OPENROUTER_API_BASE,
};
