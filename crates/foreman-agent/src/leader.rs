// ABOUTME: The leader agent: plans a goal and step list, drives the chat room, synthesizes the answer.
// ABOUTME: respond() is the fail-soft entry point; unrecovered errors become the answer text.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use foreman_core::{ChatMessage, Goal, StepPlan};

use crate::agent::{Agent, AgentParams, AgentRunner};
use crate::error::OrchestratorError;
use crate::llm::{ChatClient, StreamCallback};
use crate::registry::{AgentProfile, AgentRegistry};
use crate::room::ChatRoom;

/// Canonical registry name of the leader.
pub const LEADER_AGENT: &str = "leader";

const GOAL_PROMPT: &str = r#"Review the conversation above and decide what the user wants.

Reply with only a JSON object of this exact shape:
{"goal": "<one-sentence statement of the user's goal>", "decompositionRequired": <true if completing the goal needs work delegated to specialist agents, false if a direct answer suffices>}

Do not add any text outside the JSON object."#;

const FIXUP_PROMPT: &str = "Your previous reply was not valid JSON of the requested shape. \
Reply again with only the JSON object, no code fences, no commentary.";

const SYNTHESIS_PROMPT: &str = "Using the conversation and the team transcript above, write the \
final consolidated answer for the user. Speak directly to the user; do not mention the team or \
the transcript.";

fn step_prompt(goal: &str, catalog: &[AgentProfile]) -> String {
    let mut lines = String::new();
    for profile in catalog {
        lines.push_str(&format!("- {}: {}\n", profile.name, profile.backstory));
    }
    format!(
        r#"The goal: {goal}

These agents are available:
{lines}
Break the goal into an ordered list of steps, each assigned to one of the agents above.
Use as few steps as possible. If no agent is applicable, return an empty list.

Reply with only a JSON object of this exact shape:
{{"steps": [{{"agent": "<agent name>", "step": "<instruction for the agent>", "humanDescription": "<short progress note for the user>"}}]}}

Example with steps:
{{"steps": [{{"agent": "researcher", "step": "Find the three largest moons of Saturn.", "humanDescription": "Looking up Saturn's moons"}}]}}

Example with no applicable agent:
{{"steps": []}}"#
    )
}

/// Marker type giving the leader its own registry presence and persona.
pub struct LeaderAgent;

impl Agent for LeaderAgent {
    fn name(&self) -> &str {
        LEADER_AGENT
    }

    fn backstory(&self) -> String {
        "Coordinates a team of specialist agents: plans the work, delegates steps, and \
         synthesizes the final answer."
            .to_string()
    }

    fn role(&self) -> String {
        "the team leader".to_string()
    }
}

/// Drives one user request through the planning protocol: goal, steps,
/// room dispatch, synthesis.
pub struct Leader {
    runner: AgentRunner,
    client: Arc<dyn ChatClient>,
    model: String,
    registry: AgentRegistry,
    params: AgentParams,
}

impl Leader {
    pub fn new(
        client: Arc<dyn ChatClient>,
        model: impl Into<String>,
        registry: AgentRegistry,
        params: AgentParams,
    ) -> Self {
        let model = model.into();
        let runner = AgentRunner::new(
            Box::new(LeaderAgent),
            client.clone(),
            model.clone(),
            params.clone(),
        );
        Self {
            runner,
            client,
            model,
            registry,
            params,
        }
    }

    /// One planning turn with a single corrective re-prompt on parse
    /// failure. A second failure is a `PlanParse` error.
    async fn plan<T>(
        &self,
        mut messages: Vec<ChatMessage>,
        prompt: String,
        parse: impl Fn(&str) -> Result<T, serde_json::Error>,
    ) -> Result<T, OrchestratorError> {
        messages.push(ChatMessage::user(prompt));
        let raw = self.runner.chat(&messages, None).await?;
        match parse(&raw) {
            Ok(parsed) => Ok(parsed),
            Err(first) => {
                warn!(error = %first, "planning output failed to parse, re-prompting once");
                messages.push(ChatMessage::assistant(raw));
                messages.push(ChatMessage::user(FIXUP_PROMPT));
                let retry = self.runner.chat(&messages, None).await?;
                parse(&retry).map_err(|e| OrchestratorError::PlanParse(e.to_string()))
            }
        }
    }

    async fn generate_goal(
        &self,
        messages: &[ChatMessage],
    ) -> Result<Goal, OrchestratorError> {
        self.plan(messages.to_vec(), GOAL_PROMPT.to_string(), Goal::parse)
            .await
    }

    async fn generate_steps(
        &self,
        messages: &[ChatMessage],
        goal: &Goal,
        catalog: &[AgentProfile],
    ) -> Result<StepPlan, OrchestratorError> {
        self.plan(
            messages.to_vec(),
            step_prompt(&goal.goal, catalog),
            StepPlan::parse,
        )
        .await
    }

    /// Direct answer over the original conversation, streamed when a
    /// callback is given. Used for early exit and trivial plans.
    async fn answer_directly(
        &self,
        messages: &[ChatMessage],
        callback: Option<&StreamCallback<'_>>,
    ) -> Result<String, OrchestratorError> {
        Ok(self.runner.chat(messages, callback).await?)
    }

    fn assemble_room(&self, goal: &Goal, plan: &StepPlan) -> Result<ChatRoom, OrchestratorError> {
        // A leader-targeted step mixed into a longer plan has no
        // resolvable recipient; treat it like any unknown target.
        if plan.targets_leader(LEADER_AGENT) {
            return Err(OrchestratorError::AgentNotFound(LEADER_AGENT.to_string()));
        }

        let mut room = ChatRoom::new(&goal.goal);
        for name in plan.distinct_targets(LEADER_AGENT) {
            let agent = self.registry.instantiate(&name, self.params.clone())?;
            room.add_agent(AgentRunner::new(
                agent,
                self.client.clone(),
                self.model.clone(),
                self.params.clone(),
            ));
        }
        room.share_goal();
        Ok(room)
    }

    fn synthesis_messages(messages: &[ChatMessage], room: &ChatRoom) -> Vec<ChatMessage> {
        let mut rendered = String::from("Team transcript:\n");
        for entry in room.messages() {
            rendered.push_str(&format!(
                "[{} -> {}] {}\n",
                entry.from_agent, entry.to_agent, entry.content
            ));
        }
        rendered.push('\n');
        rendered.push_str(SYNTHESIS_PROMPT);

        let mut combined = messages.to_vec();
        combined.push(ChatMessage::user(rendered));
        combined
    }

    /// The full planning protocol. Errors propagate; use [`respond`]
    /// for the fail-soft surface.
    ///
    /// [`respond`]: Leader::respond
    pub async fn perform_user_request(
        &mut self,
        messages: &[ChatMessage],
        callback: Option<&StreamCallback<'_>>,
    ) -> Result<String, OrchestratorError> {
        let request_id = ulid::Ulid::new();
        info!(%request_id, "handling user request");

        let goal = self.generate_goal(messages).await?;
        info!(%request_id, goal = %goal.goal, decomposition = goal.decomposition_required, "goal generated");

        if !goal.decomposition_required {
            return self.answer_directly(messages, callback).await;
        }

        let catalog: Vec<AgentProfile> = self
            .registry
            .list_enabled()
            .into_iter()
            .filter(|p| p.name != LEADER_AGENT)
            .collect();
        let plan = self.generate_steps(messages, &goal, &catalog).await?;
        debug!(steps = plan.steps.len(), "step plan generated");

        if plan.is_trivial(LEADER_AGENT) {
            return self.answer_directly(messages, callback).await;
        }

        let mut room = self.assemble_room(&goal, &plan)?;
        for step in &plan.steps {
            if let Some(cb) = callback {
                cb(&format!("\n[{}] {}\n", step.agent, step.human_description));
            }
            let response = room.send_task(LEADER_AGENT, &step.agent, &step.step).await?;
            debug!(agent = %step.agent, success = response.is_success(), "step finished");
        }

        let combined = Self::synthesis_messages(messages, &room);
        Ok(self.runner.chat(&combined, callback).await?)
    }

    /// Fail-soft entry point: any unrecovered error is reported as the
    /// answer text and forwarded to the stream callback.
    pub async fn respond(
        &mut self,
        messages: &[ChatMessage],
        callback: Option<&StreamCallback<'_>>,
    ) -> String {
        match self.perform_user_request(messages, callback).await {
            Ok(answer) => answer,
            Err(e) => {
                error!(error = %e, "request failed, reporting the error as the answer");
                let text = e.to_string();
                if let Some(cb) = callback {
                    cb(&text);
                }
                text
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use serde_json::json;

    use foreman_core::{ToolDef, ToolError, ToolSet};

    use crate::agent::role_from_type_name;
    use crate::llm::ChatResponse;
    use crate::llm::testing::{ScriptedChatClient, text_response, tool_use_response};
    use crate::registry::AgentCtor;

    struct Scout;

    impl Agent for Scout {
        fn name(&self) -> &str {
            "scout"
        }
        fn backstory(&self) -> String {
            "Explores and reports back.".to_string()
        }
        fn role(&self) -> String {
            role_from_type_name(std::any::type_name::<Self>())
        }
    }

    fn scout_ctor() -> AgentCtor {
        Arc::new(|_params| Ok(Box::new(Scout) as Box<dyn Agent>))
    }

    fn registry_with_scout() -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        registry.register("scout", scout_ctor());
        registry
    }

    fn leader_with(responses: Vec<ChatResponse>) -> (Leader, Arc<ScriptedChatClient>) {
        let client = Arc::new(ScriptedChatClient::new(responses));
        let leader = Leader::new(
            client.clone(),
            "m",
            registry_with_scout(),
            AgentParams::default(),
        );
        (leader, client)
    }

    fn goal_json(decompose: bool) -> String {
        json!({"goal": "Answer the user", "decompositionRequired": decompose}).to_string()
    }

    fn user(text: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::user(text)]
    }

    #[tokio::test]
    async fn early_exit_answers_without_a_room() {
        let (mut leader, client) = leader_with(vec![
            text_response(&goal_json(false)),
            text_response("Paris."),
        ]);
        let answer = leader
            .perform_user_request(&user("Capital of France?"), None)
            .await
            .unwrap();
        assert_eq!(answer, "Paris.");
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn fenced_goal_json_still_parses() {
        let fenced = format!("```json\n{}\n```", goal_json(false));
        let (mut leader, client) =
            leader_with(vec![text_response(&fenced), text_response("Done.")]);
        let answer = leader
            .perform_user_request(&user("hi"), None)
            .await
            .unwrap();
        assert_eq!(answer, "Done.");
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn one_fixup_reprompt_recovers_a_bad_goal() {
        let (mut leader, client) = leader_with(vec![
            text_response("sorry, here is my thinking..."),
            text_response(&goal_json(false)),
            text_response("Recovered."),
        ]);
        let answer = leader
            .perform_user_request(&user("hi"), None)
            .await
            .unwrap();
        assert_eq!(answer, "Recovered.");
        assert_eq!(client.call_count(), 3);

        // The re-prompt carries the bad output back to the model.
        let retry = &client.requests()[1];
        assert!(
            retry
                .messages
                .iter()
                .any(|m| m.plain_text().contains("my thinking"))
        );
        assert!(
            retry
                .messages
                .last()
                .unwrap()
                .plain_text()
                .contains("not valid JSON")
        );
    }

    #[tokio::test]
    async fn second_parse_failure_is_a_plan_error() {
        let (mut leader, _client) = leader_with(vec![
            text_response("nonsense"),
            text_response("still nonsense"),
        ]);
        let err = leader
            .perform_user_request(&user("hi"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::PlanParse(_)));
    }

    #[tokio::test]
    async fn empty_step_plan_falls_back_to_direct_answer() {
        let (mut leader, client) = leader_with(vec![
            text_response(&goal_json(true)),
            text_response(r#"{"steps": []}"#),
            text_response("Direct anyway."),
        ]);
        let answer = leader
            .perform_user_request(&user("hi"), None)
            .await
            .unwrap();
        assert_eq!(answer, "Direct anyway.");
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn single_leader_step_is_trivial() {
        let steps =
            r#"{"steps": [{"agent": "leader", "step": "Just answer.", "humanDescription": "Answering"}]}"#;
        let (mut leader, client) = leader_with(vec![
            text_response(&goal_json(true)),
            text_response(steps),
            text_response("Handled it myself."),
        ]);
        let answer = leader
            .perform_user_request(&user("hi"), None)
            .await
            .unwrap();
        assert_eq!(answer, "Handled it myself.");
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn full_pipeline_dispatches_then_synthesizes() {
        let steps = r#"{"steps": [{"agent": "scout", "step": "Survey the ridge.", "humanDescription": "Surveying"}]}"#;
        let (mut leader, client) = leader_with(vec![
            text_response(&goal_json(true)),
            text_response(steps),
            text_response("Ridge is clear."),
            text_response("All done: the ridge is clear."),
        ]);

        let chunks = Mutex::new(String::new());
        let callback = |chunk: &str| {
            chunks.lock().unwrap().push_str(chunk);
        };
        let answer = leader
            .perform_user_request(&user("Check the ridge"), Some(&callback))
            .await
            .unwrap();
        assert_eq!(answer, "All done: the ridge is clear.");
        assert_eq!(client.call_count(), 4);

        // Progress note then the streamed synthesis text.
        let streamed = chunks.lock().unwrap().clone();
        assert!(streamed.contains("[scout] Surveying"));
        assert!(streamed.ends_with("All done: the ridge is clear."));

        // Synthesis prompt carries the room transcript.
        let synthesis = &client.requests()[3];
        let last = synthesis.messages.last().unwrap().plain_text();
        assert!(last.contains("[leader -> scout] Survey the ridge."));
        assert!(last.contains("[scout -> leader] Ridge is clear."));
    }

    struct Winch;

    impl Agent for Winch {
        fn name(&self) -> &str {
            "winch"
        }
        fn backstory(&self) -> String {
            "Hauls loads up the cliff face.".to_string()
        }
        fn role(&self) -> String {
            role_from_type_name(std::any::type_name::<Self>())
        }
        fn available_tools(&self) -> ToolSet {
            ToolSet::new("WinchTools").with(
                ToolDef::builder("haul", "Haul the load up.")
                    .build(|_| Err(ToolError::Handler("cable jammed".to_string()))),
            )
        }
    }

    #[tokio::test]
    async fn failed_step_still_reaches_synthesis_with_the_failure_on_record() {
        let steps = r#"{"steps": [{"agent": "winch", "step": "Haul the crate up.", "humanDescription": "Hauling"}]}"#;
        let client = Arc::new(ScriptedChatClient::new(vec![
            text_response(&goal_json(true)),
            text_response(steps),
            tool_use_response("call-1", "haul", json!({})),
            text_response("The haul failed; the cable jammed."),
        ]));
        let mut registry = registry_with_scout();
        registry.register(
            "winch",
            Arc::new(|_params| Ok(Box::new(Winch) as Box<dyn Agent>)),
        );
        let mut leader = Leader::new(client.clone(), "m", registry, AgentParams::default());

        let answer = leader
            .perform_user_request(&user("Get the crate up the cliff"), None)
            .await
            .unwrap();

        // The step's tool failure does not abort the run; the leader
        // still synthesizes an answer from the transcript.
        assert_eq!(answer, "The haul failed; the cable jammed.");
        assert_eq!(client.call_count(), 4);

        let synthesis = &client.requests()[3];
        let last = synthesis.messages.last().unwrap().plain_text();
        assert!(last.contains("[leader -> winch] Haul the crate up."));
        assert!(last.contains("[winch -> leader] tool error: cable jammed"));
    }

    #[tokio::test]
    async fn leader_step_alongside_others_is_fatal() {
        let steps = r#"{"steps": [
            {"agent": "scout", "step": "Survey.", "humanDescription": "Surveying"},
            {"agent": "leader", "step": "Summarize.", "humanDescription": "Summarizing"}
        ]}"#;
        let (mut leader, _client) = leader_with(vec![
            text_response(&goal_json(true)),
            text_response(steps),
        ]);
        let err = leader
            .perform_user_request(&user("hi"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::AgentNotFound(name) if name == LEADER_AGENT));
    }

    #[tokio::test]
    async fn unknown_step_target_is_fatal() {
        let steps = r#"{"steps": [{"agent": "ghost", "step": "Boo.", "humanDescription": "Haunting"}]}"#;
        let (mut leader, _client) = leader_with(vec![
            text_response(&goal_json(true)),
            text_response(steps),
        ]);
        let err = leader
            .perform_user_request(&user("hi"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::AgentNotFound(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn respond_reports_errors_as_the_answer() {
        // Exhausted script: the very first planning call fails.
        let (mut leader, _client) = leader_with(vec![]);
        let chunks = Mutex::new(String::new());
        let callback = |chunk: &str| {
            chunks.lock().unwrap().push_str(chunk);
        };
        let answer = leader.respond(&user("hi"), Some(&callback)).await;
        assert!(answer.contains("exhausted"));
        assert_eq!(*chunks.lock().unwrap(), answer);
    }

    #[tokio::test]
    async fn progress_callback_fires_per_step() {
        let steps = r#"{"steps": [{"agent": "scout", "step": "Survey.", "humanDescription": "Surveying the ridge"}]}"#;
        let (mut leader, _client) = leader_with(vec![
            text_response(&goal_json(true)),
            text_response(steps),
            text_response("clear"),
            text_response("done"),
        ]);

        let seen: Mutex<Vec<String>> = Mutex::new(Vec::new());
        let callback = |chunk: &str| {
            seen.lock().unwrap().push(chunk.to_string());
        };
        leader
            .perform_user_request(&user("go"), Some(&callback))
            .await
            .unwrap();

        let seen = seen.into_inner().unwrap();
        let progress = seen
            .iter()
            .position(|c| c.contains("Surveying the ridge"))
            .expect("progress note streamed");
        let synthesis = seen
            .iter()
            .position(|c| c.contains("done"))
            .expect("synthesis streamed");
        assert!(progress < synthesis);
    }
}
