// ABOUTME: OpenAI Chat Completions adapter implementing the ChatClient trait.
// ABOUTME: Maps content blocks to tool_calls/tool messages and streams deltas over SSE.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};

use foreman_core::{ChatMessage, ChatRole, ContentBlock};

use crate::llm::{
    ChatClient, ChatRequest, ChatResponse, LlmError, StopReason, StreamCallback, Usage,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI adapter. Calls the Chat Completions API with function
/// definitions and maps tool_calls responses back to content blocks.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    /// Create a client reading configuration from environment variables.
    /// Required: `OPENAI_API_KEY`. Optional: `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| LlmError::Provider("OPENAI_API_KEY not set".to_string()))?;
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
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

    /// Build the JSON request body for the Chat Completions API.
    pub fn build_request_body(req: &ChatRequest, stream: bool) -> Value {
        let mut messages: Vec<Value> = Vec::with_capacity(req.messages.len() + 1);
        if let Some(system) = &req.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        for msg in &req.messages {
            messages.extend(message_to_openai(msg));
        }

        let mut body = json!({
            "model": req.model,
            "max_tokens": req.max_tokens,
            "messages": messages,
        });

        if let Some(temperature) = req.temperature {
            body["temperature"] = json!(temperature);
        }
        if !req.tools.is_empty() {
            body["tools"] = Value::Array(req.tools.iter().map(tool_to_openai).collect());
            body["tool_choice"] = json!("auto");
        }
        if stream {
            body["stream"] = json!(true);
        }

        body
    }

    /// Parse a Chat Completions response into a ChatResponse.
    pub fn parse_response(body: &Value) -> Result<ChatResponse, LlmError> {
        let choice = body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .ok_or_else(|| LlmError::InvalidResponse("missing choices array".to_string()))?;

        let message = choice
            .get("message")
            .ok_or_else(|| LlmError::InvalidResponse("missing message in choice".to_string()))?;

        let mut content = Vec::new();
        if let Some(text) = message.get("content").and_then(Value::as_str)
            && !text.is_empty()
        {
            content.push(ContentBlock::text(text));
        }

        if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array) {
            for call in tool_calls {
                let function = call.get("function").ok_or_else(|| {
                    LlmError::InvalidResponse("tool_call missing function".to_string())
                })?;
                let name = function
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        LlmError::InvalidResponse("function missing name".to_string())
                    })?
                    .to_string();
                let arguments = function
                    .get("arguments")
                    .and_then(Value::as_str)
                    .unwrap_or("{}");
                let input: Value = serde_json::from_str(arguments).map_err(|e| {
                    LlmError::InvalidResponse(format!("failed to parse function arguments: {e}"))
                })?;
                let id = call
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                content.push(ContentBlock::ToolUse { id, name, input });
            }
        }

        let stop_reason = match choice.get("finish_reason").and_then(Value::as_str) {
            Some("stop") => StopReason::EndTurn,
            Some("tool_calls") => StopReason::ToolUse,
            Some("length") => StopReason::MaxTokens,
            _ => StopReason::Other,
        };

        let model = body
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let usage = body
            .get("usage")
            .map(|u| Usage {
                input_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
                output_tokens: u
                    .get("completion_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
            })
            .unwrap_or_default();

        Ok(ChatResponse {
            content,
            stop_reason,
            model,
            usage,
        })
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
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
                "Unauthorized: check OPENAI_API_KEY".to_string(),
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

/// Translate one provider-agnostic message into Chat Completions shape.
/// A message may expand into several wire messages: assistant tool_use
/// blocks become a tool_calls entry, and each tool result becomes its
/// own role:"tool" message.
fn message_to_openai(msg: &ChatMessage) -> Vec<Value> {
    let mut out = Vec::new();

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in &msg.content {
        match block {
            ContentBlock::Text { text: t } => text.push_str(t),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(json!({
                    "id": id,
                    "type": "function",
                    "function": {
                        "name": name,
                        "arguments": input.to_string(),
                    }
                }));
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error: _,
            } => {
                out.push(json!({
                    "role": "tool",
                    "tool_call_id": tool_use_id,
                    "content": content,
                }));
            }
        }
    }

    if !text.is_empty() || !tool_calls.is_empty() {
        let role = match msg.role {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Tool => "tool",
        };
        let mut wire = json!({"role": role, "content": text});
        if !tool_calls.is_empty() {
            wire["tool_calls"] = Value::Array(tool_calls);
        }
        // Tool results were already emitted above; everything else goes first.
        out.insert(0, wire);
    }

    out
}

fn tool_to_openai(tool: &Value) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.get("name").cloned().unwrap_or(Value::Null),
            "description": tool.get("description").cloned().unwrap_or(Value::Null),
            "parameters": tool
                .get("parameters")
                .cloned()
                .unwrap_or(json!({"type": "object", "properties": {}})),
        }
    })
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn complete(&self, req: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let body = Self::build_request_body(req, false);
        let response = self.post(&body).await?;
        let response_body: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse JSON: {e}")))?;
        Self::parse_response(&response_body)
    }

    // Streaming is used for tool-less chat only; tool_call deltas are
    // not reassembled here.
    async fn complete_stream(
        &self,
        req: &ChatRequest,
        on_chunk: &StreamCallback,
    ) -> Result<ChatResponse, LlmError> {
        let body = Self::build_request_body(req, true);
        let response = self.post(&body).await?;

        let mut text = String::new();
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
                if data == "[DONE]" {
                    continue;
                }
                let Ok(event) = serde_json::from_str::<Value>(data) else {
                    continue;
                };
                let Some(choice) = event
                    .get("choices")
                    .and_then(Value::as_array)
                    .and_then(|c| c.first())
                else {
                    continue;
                };

                if let Some(delta) = choice
                    .get("delta")
                    .and_then(|d| d.get("content"))
                    .and_then(Value::as_str)
                    && !delta.is_empty()
                {
                    on_chunk(delta);
                    text.push_str(delta);
                }
                if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
                    stop_reason = match reason {
                        "stop" => StopReason::EndTurn,
                        "tool_calls" => StopReason::ToolUse,
                        "length" => StopReason::MaxTokens,
                        _ => StopReason::Other,
                    };
                }
            }
        }

        Ok(ChatResponse {
            content: vec![ContentBlock::text(text)],
            stop_reason,
            model: req.model.clone(),
            usage: Usage::default(),
        })
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}
