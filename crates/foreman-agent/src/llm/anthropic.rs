// ABOUTME: Anthropic Messages API adapter implementing the ChatClient trait.
// ABOUTME: Translates provider-agnostic requests into Messages API calls, including SSE streaming.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};

use foreman_core::{ChatMessage, ChatRole, ContentBlock};

use crate::llm::{
    ChatClient, ChatRequest, ChatResponse, LlmError, StopReason, StreamCallback, Usage,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Claude adapter. Calls the Messages API with tool
/// definitions and maps content blocks both directions.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    /// Create a client reading configuration from environment variables.
    /// Required: `ANTHROPIC_API_KEY`. Optional: `ANTHROPIC_BASE_URL`.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| LlmError::Provider("ANTHROPIC_API_KEY not set".to_string()))?;
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Self::new(api_key, base_url))
    }

    /// Create a client with explicit configuration.
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }

    /// Build the JSON request body for the Messages API.
    pub fn build_request_body(req: &ChatRequest, stream: bool) -> Value {
        let messages = coalesce_messages(
            req.messages
                .iter()
                .map(message_to_anthropic)
                .collect::<Vec<_>>(),
        );

        let mut body = json!({
            "model": req.model,
            "max_tokens": req.max_tokens,
            "messages": messages,
        });

        if let Some(system) = &req.system {
            body["system"] = json!(system);
        }
        if let Some(temperature) = req.temperature {
            body["temperature"] = json!(temperature);
        }
        if !req.tools.is_empty() {
            body["tools"] = Value::Array(req.tools.iter().map(tool_to_anthropic).collect());
        }
        if stream {
            body["stream"] = json!(true);
        }

        body
    }

    /// Parse a Messages API response into a ChatResponse.
    pub fn parse_response(body: &Value) -> Result<ChatResponse, LlmError> {
        let content_array = body
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| LlmError::InvalidResponse("missing content array".to_string()))?;

        let mut content = Vec::with_capacity(content_array.len());
        for block in content_array {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    let text = block
                        .get("text")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    content.push(ContentBlock::text(text));
                }
                Some("tool_use") => {
                    let id = block
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let name = block
                        .get("name")
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            LlmError::InvalidResponse("tool_use block missing name".to_string())
                        })?
                        .to_string();
                    let input = block.get("input").cloned().unwrap_or(json!({}));
                    content.push(ContentBlock::ToolUse { id, name, input });
                }
                _ => {}
            }
        }

        let stop_reason = match body.get("stop_reason").and_then(Value::as_str) {
            Some("end_turn") => StopReason::EndTurn,
            Some("tool_use") => StopReason::ToolUse,
            Some("max_tokens") => StopReason::MaxTokens,
            _ => StopReason::Other,
        };

        let model = body
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(ChatResponse {
            content,
            stop_reason,
            model,
            usage: parse_usage(body.get("usage")),
        })
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Provider(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(LlmError::Provider(
                "Unauthorized: check ANTHROPIC_API_KEY".to_string(),
            ));
        }
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider(format!(
                "API error {status}: {error_body}"
            )));
        }
        Ok(response)
    }
}

fn parse_usage(usage: Option<&Value>) -> Usage {
    let Some(usage) = usage else {
        return Usage::default();
    };
    Usage {
        input_tokens: usage
            .get("input_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        output_tokens: usage
            .get("output_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0),
    }
}

/// Translate one provider-agnostic message into Messages API shape.
/// System-role history entries become user messages; tool results ride
/// in user messages per the API contract.
fn message_to_anthropic(msg: &ChatMessage) -> Value {
    let role = match msg.role {
        ChatRole::Assistant => "assistant",
        ChatRole::System | ChatRole::User | ChatRole::Tool => "user",
    };

    let content: Vec<Value> = msg
        .content
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => json!({"type": "text", "text": text}),
            ContentBlock::ToolUse { id, name, input } => {
                json!({"type": "tool_use", "id": id, "name": name, "input": input})
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => json!({
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": content,
                "is_error": is_error,
            }),
        })
        .collect();

    json!({"role": role, "content": content})
}

/// Merge adjacent same-role messages so the payload satisfies the API's
/// role-alternation requirement.
fn coalesce_messages(messages: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(messages.len());
    for msg in messages {
        if let Some(last) = out.last_mut()
            && last["role"] == msg["role"]
            && let (Some(existing), Some(incoming)) =
                (last["content"].as_array().cloned(), msg["content"].as_array())
        {
            let mut merged = existing;
            merged.extend(incoming.iter().cloned());
            last["content"] = Value::Array(merged);
            continue;
        }
        out.push(msg);
    }
    out
}

fn tool_to_anthropic(tool: &Value) -> Value {
    json!({
        "name": tool.get("name").cloned().unwrap_or(Value::Null),
        "description": tool.get("description").cloned().unwrap_or(Value::Null),
        "input_schema": tool
            .get("parameters")
            .cloned()
            .unwrap_or(json!({"type": "object", "properties": {}})),
    })
}

#[async_trait]
impl ChatClient for AnthropicClient {
    async fn complete(&self, req: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let body = Self::build_request_body(req, false);
        let response = self.post(&body).await?;
        let response_body: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse JSON: {e}")))?;
        Self::parse_response(&response_body)
    }

    // Streaming is used for tool-less chat only; tool_use deltas are not
    // reassembled here.
    async fn complete_stream(
        &self,
        req: &ChatRequest,
        on_chunk: &StreamCallback,
    ) -> Result<ChatResponse, LlmError> {
        let body = Self::build_request_body(req, true);
        let response = self.post(&body).await?;

        let mut text = String::new();
        let mut usage = Usage::default();
        let mut stop_reason = StopReason::EndTurn;
        let mut buffer = String::new();

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes =
                chunk.map_err(|e| LlmError::Provider(format!("stream read failed: {e}")))?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim_end_matches('\r').to_string();
                buffer.drain(..=newline);

                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                let Ok(event) = serde_json::from_str::<Value>(data) else {
                    continue;
                };

                match event.get("type").and_then(Value::as_str) {
                    Some("message_start") => {
                        usage.add(parse_usage(
                            event.get("message").and_then(|m| m.get("usage")),
                        ));
                    }
                    Some("content_block_delta") => {
                        if let Some(delta) = event
                            .get("delta")
                            .filter(|d| d.get("type").and_then(Value::as_str) == Some("text_delta"))
                            .and_then(|d| d.get("text"))
                            .and_then(Value::as_str)
                        {
                            on_chunk(delta);
                            text.push_str(delta);
                        }
                    }
                    Some("message_delta") => {
                        if let Some(reason) = event
                            .get("delta")
                            .and_then(|d| d.get("stop_reason"))
                            .and_then(Value::as_str)
                        {
                            stop_reason = match reason {
                                "end_turn" => StopReason::EndTurn,
                                "tool_use" => StopReason::ToolUse,
                                "max_tokens" => StopReason::MaxTokens,
                                _ => StopReason::Other,
                            };
                        }
                        usage.add(parse_usage(event.get("usage")));
                    }
                    _ => {}
                }
            }
        }

        Ok(ChatResponse {
            content: vec![ContentBlock::text(text)],
            stop_reason,
            model: req.model.clone(),
            usage,
        })
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }
}
