// ABOUTME: Chat provider layer: the ChatClient trait, request/response shapes, and the client factory.
// ABOUTME: Each provider sub-module adapts one LLM HTTP API to this trait.

pub mod anthropic;
pub mod openai;
pub mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use foreman_core::{ChatMessage, ContentBlock};

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;

/// Per-chunk streaming callback. Chunks are delivered in arrival order,
/// synchronously with respect to the underlying model call.
pub type StreamCallback<'a> = dyn Fn(&str) + Send + Sync + 'a;

/// Errors surfaced by a chat provider.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("rate limited")]
    RateLimited,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Other,
}

/// Token usage counters for one completed model turn.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// One provider-agnostic chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<Value>,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub const DEFAULT_MAX_TOKENS: u32 = 4096;

    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            messages: Vec::new(),
            tools: Vec::new(),
            temperature: None,
            max_tokens: Self::DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_tools(mut self, tools: Vec<Value>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

/// One provider-agnostic chat completion response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub model: String,
    pub usage: Usage,
}

impl ChatResponse {
    /// Concatenate all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// All tool invocations requested by the model, in order.
    pub fn tool_uses(&self) -> Vec<(&str, &str, &Value)> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_use(&self) -> bool {
        !self.tool_uses().is_empty()
    }
}

/// Trait every chat provider adapter implements. The runtime never
/// touches provider-specific transport details.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Run one chat completion.
    async fn complete(&self, req: &ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Run one chat completion, forwarding text chunks to the callback
    /// as they arrive. Providers without true streaming deliver the
    /// whole answer as a single chunk.
    async fn complete_stream(
        &self,
        req: &ChatRequest,
        on_chunk: &StreamCallback,
    ) -> Result<ChatResponse, LlmError> {
        let resp = self.complete(req).await?;
        let text = resp.text();
        if !text.is_empty() {
            on_chunk(&text);
        }
        Ok(resp)
    }

    /// Provider name for logging and display (e.g. "anthropic").
    fn provider_name(&self) -> &str;
}

/// Create a chat client for the given provider name.
///
/// Returns a tuple of (client, resolved_model). The model is resolved
/// from the explicit parameter, then a provider-specific environment
/// variable, then a default for that provider.
pub fn create_chat_client(
    provider: &str,
    model: Option<&str>,
) -> Result<(Arc<dyn ChatClient>, String), LlmError> {
    match provider {
        "anthropic" => {
            let client = AnthropicClient::from_env()?;
            let resolved_model = model
                .map(String::from)
                .or_else(|| std::env::var("ANTHROPIC_MODEL").ok())
                .unwrap_or_else(|| anthropic::DEFAULT_MODEL.to_string());
            Ok((Arc::new(client), resolved_model))
        }
        "openai" => {
            let client = OpenAiClient::from_env()?;
            let resolved_model = model
                .map(String::from)
                .or_else(|| std::env::var("OPENAI_MODEL").ok())
                .unwrap_or_else(|| openai::DEFAULT_MODEL.to_string());
            Ok((Arc::new(client), resolved_model))
        }
        unknown => Err(LlmError::Provider(format!(
            "unsupported chat provider: {unknown}"
        ))),
    }
}
