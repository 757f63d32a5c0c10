//! Ollama chat backend.
//!
//! Talks to `/api/chat` with streaming disabled and maps the reply onto
//! the backend-neutral [`Response`] type. All failures become
//! [`Response::error`] values.

use super::types::{Message, Response, Role, ToolCall, ToolDefinition, Usage};
use super::LlmClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error};

/// Connection settings for the Ollama client.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            temperature: 0.1,
            timeout_seconds: 300,
        }
    }
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

/// [`LlmClient`] backed by a local or remote Ollama server.
pub struct OllamaClient {
    config: OllamaConfig,
    http_client: reqwest::Client,
    next_call_id: AtomicU64,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            http_client,
            next_call_id: AtomicU64::new(0),
        })
    }

    fn build_request<'a>(
        &'a self,
        messages: &[Message],
        tools: Option<&'a [ToolDefinition]>,
        system: Option<&str>,
        max_tokens: u32,
    ) -> OllamaChatRequest<'a> {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system {
            wire.push(OllamaMessage {
                role: Role::System.as_str().to_string(),
                content: system.to_string(),
                tool_calls: None,
            });
        }
        wire.extend(messages.iter().map(to_wire_message));

        OllamaChatRequest {
            model: &self.config.model,
            messages: wire,
            tools: tools.filter(|t| !t.is_empty()),
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: max_tokens,
            },
        }
    }

    fn convert_response(&self, raw: OllamaChatResponse) -> Response {
        let tool_calls: Vec<ToolCall> = raw
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| {
                let n = self.next_call_id.fetch_add(1, Ordering::Relaxed);
                ToolCall::new(
                    format!("call_{}", n),
                    call.function.name,
                    normalize_arguments(call.function.arguments),
                )
            })
            .collect();

        let usage = match (raw.prompt_eval_count, raw.eval_count) {
            (None, None) => None,
            (input, output) => Some(Usage {
                input_tokens: input.unwrap_or(0),
                output_tokens: output.unwrap_or(0),
            }),
        };

        let stop_reason = if tool_calls.is_empty() {
            raw.done_reason.unwrap_or_else(|| "end_turn".to_string())
        } else {
            "tool_use".to_string()
        };

        Response {
            content: raw.message.content,
            tool_calls,
            stop_reason,
            usage,
        }
    }

    async fn send(&self, request: &OllamaChatRequest<'_>) -> Result<OllamaChatResponse> {
        let url = format!("{}/api/chat", self.config.base_url.trim_end_matches('/'));

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!("Request timed out after {}s", self.config.timeout_seconds)
                } else if e.is_connect() {
                    anyhow::anyhow!(
                        "Cannot connect to Ollama at {}. Is Ollama running?",
                        self.config.base_url
                    )
                } else {
                    anyhow::anyhow!("Failed to send request: {}", e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Ollama API error {}: {}", status, body));
        }

        response
            .json()
            .await
            .context("Failed to parse Ollama response")
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        system: Option<&str>,
        max_tokens: u32,
    ) -> Response {
        let request = self.build_request(messages, tools, system, max_tokens);
        debug!("Sending chat request with {} messages", request.messages.len());

        match self.send(&request).await {
            Ok(raw) => self.convert_response(raw),
            Err(e) => {
                error!("LLM request failed: {:#}", e);
                Response::error(format!("LLM Error: {:#}", e))
            }
        }
    }
}

fn to_wire_message(msg: &Message) -> OllamaMessage {
    let tool_calls = if msg.tool_calls.is_empty() {
        None
    } else {
        Some(
            msg.tool_calls
                .iter()
                .map(|call| OllamaToolCall {
                    function: OllamaFunction {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
        )
    };

    OllamaMessage {
        role: msg.role.as_str().to_string(),
        content: msg.content.clone(),
        tool_calls,
    }
}

/// Some models return arguments as a JSON-encoded string.
fn normalize_arguments(arguments: Value) -> Value {
    match arguments {
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        Value::Null => Value::Object(Default::default()),
        other => other,
    }
}
