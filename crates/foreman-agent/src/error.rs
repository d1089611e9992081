// ABOUTME: Error types for the orchestration runtime.
// ABOUTME: Distinguishes planning-schema failures, unknown agents, tool errors, and provider errors.

use thiserror::Error;

use foreman_core::ToolError;

use crate::llm::LlmError;

/// Errors that can occur while orchestrating a user request.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A step or caller referenced a name with no registry entry. Treated
    /// as a planning bug, not recoverable user input.
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    /// The model's planning output failed to match the Goal or Steps
    /// schema even after the one-shot corrective re-prompt.
    #[error("planning output did not match the expected schema: {0}")]
    PlanParse(String),

    /// An agent constructor refused to build an instance.
    #[error("agent construction failed: {0}")]
    Construction(String),

    #[error("chat provider error: {0}")]
    Llm(#[from] LlmError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_failure() {
        let errors = vec![
            OrchestratorError::AgentNotFound("ghost_agent".to_string()),
            OrchestratorError::PlanParse("expected object".to_string()),
            OrchestratorError::Construction("missing project".to_string()),
            OrchestratorError::Llm(LlmError::RateLimited),
            OrchestratorError::Tool(ToolError::UnknownTool("x".to_string())),
        ];

        for err in &errors {
            assert!(!err.to_string().is_empty());
        }

        assert!(
            OrchestratorError::AgentNotFound("ghost_agent".to_string())
                .to_string()
                .contains("ghost_agent")
        );
    }
}
