//! LlmProvider trait definition.
//!
//! This is the abstraction the llm step talks to. Uses native async fn
//! in traits (RPITIT, Rust 2024 edition); the object-safe wrapper lives
//! in [`super::box_provider`].

use agentflow_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Trait for LLM provider backends.
///
/// Implementations live in agentflow-infra (e.g., `OpenAiProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}
