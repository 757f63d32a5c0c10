//! LLM backend contract and adapters.
//!
//! The engine only talks to [`LlmClient`]; [`OllamaClient`] is the
//! production implementation used by the binary.

pub mod ollama;
pub mod tools;
pub mod types;

pub use ollama::{OllamaClient, OllamaConfig};
pub use tools::agent_tools;
pub use types::{Message, Response, Role, ToolCall, ToolDefinition, Usage};

use async_trait::async_trait;

/// Chat-completion backend with tool calling.
///
/// Implementations never fail: transport or decoding problems are
/// reported as a [`Response::error`] so the tool loop always receives a
/// well-formed reply.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        system: Option<&str>,
        max_tokens: u32,
    ) -> Response;
}
