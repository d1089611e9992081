// ABOUTME: ChatSession wraps one conversation with a chat provider, with optional tool augmentation.
// ABOUTME: run_tools drives the think-act loop: execute requested tools, feed results back, repeat.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use foreman_core::{ChatMessage, ChatRole, ContentBlock, ToolSet};

use crate::error::OrchestratorError;
use crate::llm::{ChatClient, ChatRequest, LlmError, StopReason, StreamCallback, Usage};

/// Default cap on think-act iterations in a tool-augmented run.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// One conversation with a chat provider, configured with a system
/// prompt, optional temperature, and an optional tool set.
pub struct ChatSession {
    client: Arc<dyn ChatClient>,
    model: String,
    system: Option<String>,
    temperature: Option<f32>,
    tools: ToolSet,
    messages: Vec<ChatMessage>,
    usage: Usage,
}

impl ChatSession {
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            system: None,
            temperature: None,
            tools: ToolSet::default(),
            messages: Vec::new(),
            usage: Usage::default(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    /// Append a text message to the conversation.
    pub fn add_message(&mut self, role: ChatRole, text: impl Into<String>) {
        self.messages.push(ChatMessage::text(role, text));
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Accumulated token usage across all completed turns.
    pub fn usage(&self) -> Usage {
        self.usage
    }

    fn base_request(&self) -> ChatRequest {
        let mut req = ChatRequest::new(&self.model)
            .with_messages(self.messages.clone())
            .with_temperature(self.temperature);
        if let Some(system) = &self.system {
            req = req.with_system(system.clone());
        }
        req
    }

    /// Ask the session a question: append the user message, run one
    /// completion, record the assistant reply, and return its text. If
    /// a stream callback is supplied, chunks are forwarded as they
    /// arrive and the concatenated text is returned.
    pub async fn ask(
        &mut self,
        text: &str,
        on_chunk: Option<&StreamCallback<'_>>,
    ) -> Result<String, LlmError> {
        self.add_message(ChatRole::User, text);
        let req = self.base_request();

        let resp = match on_chunk {
            Some(callback) => self.client.complete_stream(&req, callback).await?,
            None => self.client.complete(&req).await?,
        };
        self.usage.add(resp.usage);

        let answer = resp.text();
        self.messages.push(ChatMessage {
            role: ChatRole::Assistant,
            content: resp.content,
        });
        Ok(answer)
    }

    /// Run the tool-augmented loop over the already-queued messages.
    ///
    /// Each iteration sends the conversation with the session's tool
    /// definitions, executes every requested tool, and appends the
    /// results. An error raised inside a tool handler aborts the loop
    /// and propagates to the caller; the agent boundary converts it to
    /// an error envelope. Returns the last assistant text once the
    /// model ends its turn or the iteration cap is reached.
    pub async fn run_tools(&mut self, max_iterations: usize) -> Result<String, OrchestratorError> {
        let definitions = self.tools.definitions_json();
        let mut last_text = String::new();

        for iteration in 0..max_iterations {
            let req = self.base_request().with_tools(definitions.clone());
            let resp = self.client.complete(&req).await?;
            self.usage.add(resp.usage);

            let text = resp.text();
            if !text.is_empty() {
                last_text = text;
            }

            let tool_uses: Vec<(String, String, Value)> = resp
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();

            self.messages.push(ChatMessage {
                role: ChatRole::Assistant,
                content: resp.content,
            });

            if tool_uses.is_empty() || resp.stop_reason == StopReason::EndTurn {
                return Ok(last_text);
            }

            for (id, name, input) in tool_uses {
                let value = self.tools.execute(&name, input).map_err(|e| {
                    warn!(tool = %name, error = %e, "tool execution failed");
                    e
                })?;
                let content = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                debug!(tool = %name, iteration, "tool executed");
                self.messages.push(ChatMessage {
                    role: ChatRole::Tool,
                    content: vec![ContentBlock::ToolResult {
                        tool_use_id: id,
                        content,
                        is_error: false,
                    }],
                });
            }
        }

        warn!(max_iterations, "tool loop hit iteration cap");
        Ok(last_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use foreman_core::{ToolDef, ToolError, ToolParam};

    use crate::llm::testing::{ScriptedChatClient, text_response, tool_use_response};

    fn lookup_tools() -> ToolSet {
        ToolSet::new("TestTools")
            .with(
                ToolDef::builder("lookup", "Look up a record by id.")
                    .param(ToolParam::integer("id", "Record id.").required())
                    .build(|args| Ok(json!(format!("record-{}", args["id"])))),
            )
            .with(
                ToolDef::builder("explode", "Always fails.")
                    .build(|_| Err(ToolError::Handler("kaboom".to_string()))),
            )
    }

    #[tokio::test]
    async fn ask_appends_history_and_returns_text() {
        let client = Arc::new(ScriptedChatClient::new(vec![text_response("hi there")]));
        let mut session = ChatSession::new(client.clone(), "m").with_system("sys");

        let answer = session.ask("hello", None).await.unwrap();
        assert_eq!(answer, "hi there");
        assert_eq!(session.messages().len(), 2);

        let req = &client.requests()[0];
        assert_eq!(req.system.as_deref(), Some("sys"));
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].plain_text(), "hello");
    }

    #[tokio::test]
    async fn run_tools_executes_and_feeds_back_results() {
        let client = Arc::new(ScriptedChatClient::new(vec![
            tool_use_response("call-1", "lookup", json!({"id": 7})),
            text_response("Record 7 is healthy."),
        ]));
        let mut session = ChatSession::new(client.clone(), "m").with_tools(lookup_tools());
        session.add_message(ChatRole::User, "check record 7");

        let answer = session.run_tools(DEFAULT_MAX_ITERATIONS).await.unwrap();
        assert_eq!(answer, "Record 7 is healthy.");

        // Second request must include the tool result from the first turn.
        let second = &client.requests()[1];
        let tool_result = second
            .messages
            .iter()
            .find(|m| m.role == ChatRole::Tool)
            .expect("tool result message");
        match &tool_result.content[0] {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                assert_eq!(tool_use_id, "call-1");
                assert_eq!(content, "record-7");
                assert!(!is_error);
            }
            other => panic!("expected tool result, got {:?}", other),
        }

        // Requests carry the tool definitions.
        assert_eq!(second.tools.len(), 2);
    }

    #[tokio::test]
    async fn failing_tool_aborts_the_loop() {
        let client = Arc::new(ScriptedChatClient::new(vec![
            tool_use_response("call-1", "explode", json!({})),
            text_response("never reached"),
        ]));
        let mut session = ChatSession::new(client.clone(), "m").with_tools(lookup_tools());
        session.add_message(ChatRole::User, "go");

        let err = session
            .run_tools(DEFAULT_MAX_ITERATIONS)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("kaboom"));
        // The failure surfaces immediately: no follow-up model call.
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_request_aborts_the_loop() {
        let client = Arc::new(ScriptedChatClient::new(vec![
            tool_use_response("call-1", "missing_tool", json!({})),
            text_response("never reached"),
        ]));
        let mut session = ChatSession::new(client.clone(), "m").with_tools(lookup_tools());
        session.add_message(ChatRole::User, "go");

        let err = session
            .run_tools(DEFAULT_MAX_ITERATIONS)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Tool(ToolError::UnknownTool(name)) if name == "missing_tool"
        ));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn iteration_cap_stops_a_looping_model() {
        // Model keeps asking for tools forever; cap at 2 iterations.
        let client = Arc::new(ScriptedChatClient::new(vec![
            tool_use_response("1", "lookup", json!({"id": 1})),
            tool_use_response("2", "lookup", json!({"id": 2})),
        ]));
        let mut session = ChatSession::new(client.clone(), "m").with_tools(lookup_tools());
        session.add_message(ChatRole::User, "go");

        let answer = session.run_tools(2).await.unwrap();
        assert_eq!(answer, "");
        assert_eq!(client.call_count(), 2);
    }
}
