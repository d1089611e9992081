// ABOUTME: The Agent trait plus the AgentRunner that gives any agent a working chat session.
// ABOUTME: Also carries AgentParams/DomainContext and the GenerationSink tracing hook.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, instrument};

use foreman_core::{ChatMessage, ChatRole, TaskResponse, ToolSet};

use crate::llm::{ChatClient, ChatRequest, LlmError, StreamCallback, Usage};
use crate::session::{ChatSession, DEFAULT_MAX_ITERATIONS};

/// A capability the orchestrator can dispatch work to. Implementations
/// describe themselves; the [`AgentRunner`] supplies the model plumbing.
pub trait Agent: Send + Sync {
    /// Stable identifier used in plans and transcripts.
    fn name(&self) -> &str;

    /// One-paragraph capability description shown to the planner.
    fn backstory(&self) -> String;

    /// The persona the agent adopts in its system prompt.
    fn role(&self) -> String;

    fn available_tools(&self) -> ToolSet {
        ToolSet::default()
    }

    fn enabled(&self) -> bool {
        true
    }

    fn temperature(&self) -> Option<f32> {
        None
    }
}

/// Default role text derived from a Rust type name: the trailing path
/// segment, lower-cased, with spaces at word boundaries. Keeps concrete
/// agents honest when they don't override `role()`.
pub fn role_from_type_name(type_name: &str) -> String {
    let tail = type_name.rsplit("::").next().unwrap_or(type_name);
    let mut out = String::with_capacity(tail.len() + 4);
    for (i, c) in tail.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            out.push(' ');
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Domain knowledge threaded into every agent's system prompt.
#[derive(Debug, Clone)]
pub struct DomainContext {
    /// Optional project description the agents are working within.
    pub project: Option<String>,
    /// Language the final answers must be written in.
    pub language: String,
}

impl Default for DomainContext {
    fn default() -> Self {
        Self {
            project: None,
            language: "English".to_string(),
        }
    }
}

/// One completed model turn, reported to an attached tracer.
#[derive(Debug, Clone)]
pub struct GenerationRecord {
    pub agent: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Receives a record for every completed model turn an agent makes.
pub trait GenerationSink: Send + Sync {
    fn record(&self, record: GenerationRecord);
}

/// Construction-time knobs shared by all agents.
#[derive(Clone, Default)]
pub struct AgentParams {
    pub context: DomainContext,
    pub tracer: Option<Arc<dyn GenerationSink>>,
    /// Overrides each agent's own `temperature()` when set.
    pub temperature: Option<f32>,
}

/// Binds an [`Agent`] to a chat client and drives its conversation.
///
/// The underlying [`ChatSession`] is built lazily on first use and
/// reused for the rest of the runner's life, so an agent keeps its
/// working memory across tasks in the same request.
pub struct AgentRunner {
    agent: Box<dyn Agent>,
    client: Arc<dyn ChatClient>,
    model: String,
    params: AgentParams,
    session: Option<ChatSession>,
}

impl AgentRunner {
    pub fn new(
        agent: Box<dyn Agent>,
        client: Arc<dyn ChatClient>,
        model: impl Into<String>,
        params: AgentParams,
    ) -> Self {
        Self {
            agent,
            client,
            model: model.into(),
            params,
            session: None,
        }
    }

    pub fn name(&self) -> &str {
        self.agent.name()
    }

    pub fn agent(&self) -> &dyn Agent {
        self.agent.as_ref()
    }

    fn temperature(&self) -> Option<f32> {
        self.params.temperature.or_else(|| self.agent.temperature())
    }

    /// Deterministic system prompt: persona, backstory, context, time,
    /// and the target answer language.
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!(
            "You are {}, {}.\n\n{}",
            self.agent.name(),
            self.agent.role(),
            self.agent.backstory()
        );
        if let Some(project) = &self.params.context.project {
            prompt.push_str("\n\nProject context: ");
            prompt.push_str(project);
        }
        prompt.push_str(&format!(
            "\n\nThe current time is {}.\nAlways answer in {}.",
            Utc::now().to_rfc3339(),
            self.params.context.language
        ));
        prompt
    }

    fn session_mut(&mut self) -> &mut ChatSession {
        if self.session.is_none() {
            let session = ChatSession::new(self.client.clone(), self.model.clone())
                .with_system(self.system_prompt())
                .with_temperature(self.temperature())
                .with_tools(self.agent.available_tools());
            self.session = Some(session);
        }
        // Just set above if it was empty.
        self.session.as_mut().unwrap()
    }

    fn trace(&self, before: Usage, after: Usage) {
        if let Some(tracer) = &self.params.tracer {
            tracer.record(GenerationRecord {
                agent: self.agent.name().to_string(),
                model: self.model.clone(),
                input_tokens: after.input_tokens - before.input_tokens,
                output_tokens: after.output_tokens - before.output_tokens,
            });
        }
    }

    /// Queue a message on the agent's session without running it.
    pub fn add_message(&mut self, role: ChatRole, text: impl Into<String>) {
        self.session_mut().add_message(role, text);
    }

    /// One-shot completion over caller-supplied history, outside the
    /// agent's own session. Used for planning and synthesis turns.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        on_chunk: Option<&StreamCallback<'_>>,
    ) -> Result<String, LlmError> {
        let mut req = ChatRequest::new(&self.model)
            .with_system(self.system_prompt())
            .with_messages(messages.to_vec())
            .with_temperature(self.temperature());
        if req
            .messages
            .last()
            .is_none_or(|m| m.role != ChatRole::User)
        {
            req.messages.push(ChatMessage::user("Continue."));
        }

        let resp = match on_chunk {
            Some(callback) => self.client.complete_stream(&req, callback).await?,
            None => self.client.complete(&req).await?,
        };
        self.trace(Usage::default(), resp.usage);
        Ok(resp.text())
    }

    /// Run the queued task through the tool loop. Failures never
    /// escape: the caller gets an error envelope instead.
    #[instrument(skip(self), fields(agent = %self.agent.name()))]
    pub async fn perform_task(&mut self) -> TaskResponse {
        let before = self.session_mut().usage();
        let result = self.session_mut().run_tools(DEFAULT_MAX_ITERATIONS).await;
        let after = self.session_mut().usage();
        self.trace(before, after);

        match result {
            Ok(text) => {
                debug!(chars = text.len(), "task completed");
                TaskResponse::success(json!(text))
            }
            Err(e) => TaskResponse::error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use foreman_core::{ToolDef, ToolError};

    use crate::llm::testing::{
        ScriptedChatClient, StubChatClient, text_response, tool_use_response,
    };

    struct Echo;

    impl Agent for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn backstory(&self) -> String {
            "Repeats things back.".to_string()
        }
        fn role(&self) -> String {
            role_from_type_name(std::any::type_name::<Self>())
        }
    }

    #[derive(Default)]
    struct MemorySink(Mutex<Vec<GenerationRecord>>);

    impl GenerationSink for MemorySink {
        fn record(&self, record: GenerationRecord) {
            self.0.lock().unwrap().push(record);
        }
    }

    #[test]
    fn role_from_type_name_splits_camel_case() {
        assert_eq!(role_from_type_name("foreman::agents::GeneralAgent"), "general agent");
        assert_eq!(role_from_type_name("Echo"), "echo");
    }

    #[test]
    fn system_prompt_carries_persona_and_language() {
        let runner = AgentRunner::new(
            Box::new(Echo),
            Arc::new(StubChatClient::new("ok")),
            "m",
            AgentParams {
                context: DomainContext {
                    project: Some("inventory tracker".to_string()),
                    language: "French".to_string(),
                },
                tracer: None,
                temperature: None,
            },
        );
        let prompt = runner.system_prompt();
        assert!(prompt.contains("You are echo"));
        assert!(prompt.contains("Repeats things back."));
        assert!(prompt.contains("inventory tracker"));
        assert!(prompt.contains("Always answer in French."));
    }

    #[tokio::test]
    async fn perform_task_wraps_success_in_envelope() {
        let client = Arc::new(ScriptedChatClient::new(vec![text_response("done it")]));
        let mut runner =
            AgentRunner::new(Box::new(Echo), client, "m", AgentParams::default());
        runner.add_message(ChatRole::User, "do the thing");

        let resp = runner.perform_task().await;
        assert!(resp.is_success());
        assert_eq!(resp.display_text(), "done it");
    }

    #[tokio::test]
    async fn perform_task_turns_llm_failure_into_error_envelope() {
        // Scripted client with no responses fails on the first call.
        let client = Arc::new(ScriptedChatClient::new(vec![]));
        let mut runner =
            AgentRunner::new(Box::new(Echo), client, "m", AgentParams::default());
        runner.add_message(ChatRole::User, "do the thing");

        let resp = runner.perform_task().await;
        assert!(resp.is_error());
    }

    struct Rigger;

    impl Agent for Rigger {
        fn name(&self) -> &str {
            "rigger"
        }
        fn backstory(&self) -> String {
            "Operates the hoist.".to_string()
        }
        fn role(&self) -> String {
            role_from_type_name(std::any::type_name::<Self>())
        }
        fn available_tools(&self) -> ToolSet {
            ToolSet::new("RiggerTools").with(
                ToolDef::builder("hoist", "Lift the load.")
                    .build(|_| Err(ToolError::Handler("wire snapped".to_string()))),
            )
        }
    }

    #[tokio::test]
    async fn perform_task_turns_tool_failure_into_error_envelope() {
        let client = Arc::new(ScriptedChatClient::new(vec![
            tool_use_response("call-1", "hoist", json!({})),
            text_response("never reached"),
        ]));
        let mut runner =
            AgentRunner::new(Box::new(Rigger), client.clone(), "m", AgentParams::default());
        runner.add_message(ChatRole::User, "lift it");

        let resp = runner.perform_task().await;
        assert!(resp.is_error());
        assert!(resp.display_text().contains("wire snapped"));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn tracer_sees_each_generation() {
        let sink = Arc::new(MemorySink::default());
        let client = Arc::new(ScriptedChatClient::new(vec![text_response("done")]));
        let mut runner = AgentRunner::new(
            Box::new(Echo),
            client,
            "m",
            AgentParams {
                context: DomainContext::default(),
                tracer: Some(sink.clone()),
                temperature: None,
            },
        );
        runner.add_message(ChatRole::User, "go");
        runner.perform_task().await;

        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].agent, "echo");
        assert_eq!(records[0].model, "m");
    }

    #[tokio::test]
    async fn chat_appends_continue_when_history_ends_with_assistant() {
        let client = Arc::new(ScriptedChatClient::new(vec![text_response("next")]));
        let runner = AgentRunner::new(
            Box::new(Echo),
            client.clone(),
            "m",
            AgentParams::default(),
        );
        let history = vec![ChatMessage::assistant("previous answer")];
        let out = runner.chat(&history, None).await.unwrap();
        assert_eq!(out, "next");
        let req = &client.requests()[0];
        assert_eq!(req.messages.last().unwrap().role, ChatRole::User);
    }
}
