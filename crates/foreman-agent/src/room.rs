// ABOUTME: ChatRoom is the per-request message bus between the leader and its worker agents.
// ABOUTME: Holds the shared goal, the member runners, and an ordered transcript of exchanges.

use std::collections::HashMap;

use tracing::{debug, info};

use foreman_core::{ChatRole, TaskResponse, TranscriptEntry};

use crate::agent::AgentRunner;
use crate::error::OrchestratorError;

/// A transient room assembled per request. Members are keyed by agent
/// name; the transcript records every instruction and reply in order.
pub struct ChatRoom {
    goal: String,
    agents: HashMap<String, AgentRunner>,
    transcript: Vec<TranscriptEntry>,
    // Per-member count of transcript entries already forwarded, so a
    // later task can depend on earlier exchanges without re-sending them.
    seen: HashMap<String, usize>,
}

impl ChatRoom {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            agents: HashMap::new(),
            transcript: Vec::new(),
            seen: HashMap::new(),
        }
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn add_agent(&mut self, runner: AgentRunner) {
        debug!(agent = %runner.name(), "agent joined room");
        self.agents.insert(runner.name().to_string(), runner);
    }

    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Announce the shared goal to every member so each agent sees the
    /// overall objective before its own instruction arrives.
    pub fn share_goal(&mut self) {
        let announcement = format!("The goal of this conversation: {}", self.goal);
        for runner in self.agents.values_mut() {
            runner.add_message(ChatRole::System, announcement.clone());
        }
    }

    /// Deliver an instruction from `from` to `to`, run the recipient's
    /// task, and record both sides in the transcript.
    pub async fn send_task(
        &mut self,
        from: &str,
        to: &str,
        instruction: &str,
    ) -> Result<TaskResponse, OrchestratorError> {
        let runner = self
            .agents
            .get_mut(to)
            .ok_or_else(|| OrchestratorError::AgentNotFound(to.to_string()))?;

        // Catch the recipient up on exchanges it has not yet seen, so a
        // later step can build on an earlier step's output.
        let cursor = self.seen.get(to).copied().unwrap_or(0);
        for entry in &self.transcript[cursor..] {
            runner.add_message(
                ChatRole::System,
                format!("[{} -> {}] {}", entry.from_agent, entry.to_agent, entry.content),
            );
        }

        self.transcript
            .push(TranscriptEntry::new(ChatRole::User, from, to, instruction));

        info!(from, to, "dispatching task");
        runner.add_message(ChatRole::User, instruction);
        let response = runner.perform_task().await;

        self.transcript.push(TranscriptEntry::new(
            ChatRole::Assistant,
            to,
            from,
            response.display_text(),
        ));
        self.seen.insert(to.to_string(), self.transcript.len());
        Ok(response)
    }

    /// The ordered transcript of every exchange so far.
    pub fn messages(&self) -> &[TranscriptEntry] {
        &self.transcript
    }
}
