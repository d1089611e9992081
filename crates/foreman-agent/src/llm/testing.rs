// ABOUTME: Test doubles for the ChatClient trait, used to simulate model responses without API calls.
// ABOUTME: StubChatClient repeats one text; ScriptedChatClient plays back a queued response sequence.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use foreman_core::ContentBlock;

use crate::llm::{ChatClient, ChatRequest, ChatResponse, LlmError, StopReason, Usage};

/// Build a text-only response that terminates an agent loop.
pub fn text_response(text: &str) -> ChatResponse {
    ChatResponse {
        content: vec![ContentBlock::text(text)],
        stop_reason: StopReason::EndTurn,
        model: "stub-model".to_string(),
        usage: Usage::default(),
    }
}

/// Build a response requesting one tool invocation.
pub fn tool_use_response(id: &str, name: &str, input: Value) -> ChatResponse {
    ChatResponse {
        content: vec![ContentBlock::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input,
        }],
        stop_reason: StopReason::ToolUse,
        model: "stub-model".to_string(),
        usage: Usage::default(),
    }
}

/// A stub client that always returns the same text response.
///
/// Drives any chat or tool loop to immediate completion: the response
/// carries no tool-use blocks, so callers see a finished turn.
#[derive(Debug, Clone)]
pub struct StubChatClient {
    response_text: String,
}

impl StubChatClient {
    pub fn new(response_text: &str) -> Self {
        Self {
            response_text: response_text.to_owned(),
        }
    }

    /// Convenience constructor returning "Done."
    pub fn done() -> Self {
        Self::new("Done.")
    }
}

#[async_trait]
impl ChatClient for StubChatClient {
    async fn complete(&self, _req: &ChatRequest) -> Result<ChatResponse, LlmError> {
        Ok(text_response(&self.response_text))
    }

    fn provider_name(&self) -> &str {
        "stub"
    }
}

/// A scripted client that returns queued responses in order and records
/// every request it receives for later assertions.
pub struct ScriptedChatClient {
    responses: Mutex<VecDeque<ChatResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChatClient {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of completion calls made so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Snapshot of all requests received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn complete(&self, req: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.requests.lock().unwrap().push(req.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::Provider("scripted responses exhausted".to_string()))
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}
