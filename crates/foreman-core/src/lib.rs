// ABOUTME: Core library for foreman, containing the shared data model used across all components.
// ABOUTME: Defines chat messages, plan types, transcript entries, tool responses, and the tool DSL.

pub mod message;
pub mod plan;
pub mod response;
pub mod tools;
pub mod transcript;

pub use message::{ChatMessage, ChatRole, ContentBlock};
pub use plan::{Goal, Step, StepPlan};
pub use response::{TaskResponse, TaskStatus, ToolResponse};
pub use tools::{
    PLACEHOLDER_PARAM, ParamKind, ToolDef, ToolError, ToolParam, ToolSet, compile_schema,
    params_from_schema,
};
pub use transcript::TranscriptEntry;
