// ABOUTME: Planning wire types produced by the leader's schema-constrained model calls.
// ABOUTME: Goal and StepPlan match the JSON contracts; a lenient extractor tolerates fenced output.

use serde::{Deserialize, Serialize};

/// The distilled objective extracted from a user's raw request.
/// Created once per request and immutable afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub goal: String,
    #[serde(alias = "decompositionRequired")]
    pub decomposition_required: bool,
}

/// One planned unit of work assigned to a named agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub agent: String,
    pub step: String,
    #[serde(alias = "humanDescription")]
    pub human_description: String,
}

/// The ordered step list produced by the leader's planning call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepPlan {
    pub steps: Vec<Step>,
}

impl Goal {
    /// Parse a goal from raw model output, tolerating code fences.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(extract_json(raw))
    }
}

impl StepPlan {
    /// Parse a step plan from raw model output, tolerating code fences.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(extract_json(raw))
    }

    /// A plan is trivial when it is empty or contains exactly one step
    /// whose target is the leader itself. Trivial plans fall back to a
    /// direct chat call.
    pub fn is_trivial(&self, leader_name: &str) -> bool {
        match self.steps.as_slice() {
            [] => true,
            [only] => is_leader_name(&only.agent, leader_name),
            _ => false,
        }
    }

    /// Distinct target agent names in first-appearance order, excluding
    /// the leader's own name.
    pub fn distinct_targets(&self, leader_name: &str) -> Vec<String> {
        let mut seen = Vec::new();
        for step in &self.steps {
            if is_leader_name(&step.agent, leader_name) {
                continue;
            }
            if !seen.iter().any(|name| name == &step.agent) {
                seen.push(step.agent.clone());
            }
        }
        seen
    }

    /// True if any step targets the leader. A leader-targeted step mixed
    /// into a multi-step plan is treated as an unresolvable target by the
    /// orchestrator rather than silently dropped.
    pub fn targets_leader(&self, leader_name: &str) -> bool {
        self.steps
            .iter()
            .any(|step| is_leader_name(&step.agent, leader_name))
    }
}

fn is_leader_name(candidate: &str, leader_name: &str) -> bool {
    candidate == leader_name || candidate == "leader"
}

/// Extract the JSON payload from raw model output. Strips markdown code
/// fences and surrounding prose by slicing from the first `{` to the
/// matching final `}`. Returns the input unchanged when no braces exist
/// so serde can report the real error.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goal_parses_plain_json() {
        let goal = Goal::parse(r#"{"goal": "find project id", "decomposition_required": false}"#)
            .expect("parse goal");
        assert_eq!(goal.goal, "find project id");
        assert!(!goal.decomposition_required);
    }

    #[test]
    fn goal_parses_fenced_json_with_camel_case_alias() {
        let raw = "```json\n{\"goal\": \"list issues\", \"decompositionRequired\": true}\n```";
        let goal = Goal::parse(raw).expect("parse fenced goal");
        assert_eq!(goal.goal, "list issues");
        assert!(goal.decomposition_required);
    }

    #[test]
    fn goal_parse_fails_on_prose() {
        assert!(Goal::parse("I could not produce a goal.").is_err());
    }

    #[test]
    fn step_plan_parses_and_preserves_order() {
        let raw = r#"{"steps": [
            {"agent": "project_agent", "step": "find id of my_project", "human_description": "Looking up project..."},
            {"agent": "issue_agent", "step": "list issues for that id", "human_description": "Fetching issues..."}
        ]}"#;
        let plan = StepPlan::parse(raw).expect("parse plan");
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].agent, "project_agent");
        assert_eq!(plan.steps[1].agent, "issue_agent");
    }

    #[test]
    fn empty_plan_is_trivial() {
        let plan = StepPlan::parse(r#"{"steps": []}"#).expect("parse empty plan");
        assert!(plan.is_trivial("leader_agent"));
    }

    #[test]
    fn single_leader_step_is_trivial() {
        let plan = StepPlan {
            steps: vec![Step {
                agent: "leader".to_string(),
                step: "answer directly".to_string(),
                human_description: "Answering...".to_string(),
            }],
        };
        assert!(plan.is_trivial("leader_agent"));
        assert!(plan.targets_leader("leader_agent"));
    }

    #[test]
    fn multi_step_plan_is_not_trivial() {
        let plan = StepPlan {
            steps: vec![
                Step {
                    agent: "project_agent".to_string(),
                    step: "a".to_string(),
                    human_description: "A".to_string(),
                },
                Step {
                    agent: "leader_agent".to_string(),
                    step: "b".to_string(),
                    human_description: "B".to_string(),
                },
            ],
        };
        assert!(!plan.is_trivial("leader_agent"));
        assert!(plan.targets_leader("leader_agent"));
    }

    #[test]
    fn distinct_targets_dedups_and_excludes_leader() {
        let mk = |agent: &str| Step {
            agent: agent.to_string(),
            step: "s".to_string(),
            human_description: "d".to_string(),
        };
        let plan = StepPlan {
            steps: vec![
                mk("issue_agent"),
                mk("project_agent"),
                mk("issue_agent"),
                mk("leader"),
            ],
        };
        assert_eq!(
            plan.distinct_targets("leader_agent"),
            vec!["issue_agent".to_string(), "project_agent".to_string()]
        );
    }

    #[test]
    fn extract_json_handles_prose_wrapping() {
        let raw = "Here is the plan:\n```json\n{\"steps\": []}\n```\nLet me know!";
        assert_eq!(extract_json(raw), "{\"steps\": []}");
        assert_eq!(extract_json("no braces at all"), "no braces at all");
    }
}
