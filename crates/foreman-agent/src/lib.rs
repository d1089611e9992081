// ABOUTME: Agent runtime for foreman, orchestrating model-backed agents over a chat primitive.
// ABOUTME: Provides the chat client layer, agent trait and runner, registry, chat room, and leader.

pub mod agent;
pub mod agents;
pub mod config;
pub mod error;
pub mod leader;
pub mod llm;
pub mod registry;
pub mod room;
pub mod session;

pub use agent::{
    Agent, AgentParams, AgentRunner, DomainContext, GenerationRecord, GenerationSink,
    role_from_type_name,
};
pub use agents::GeneralAgent;
pub use config::{ConfigError, ForemanConfig};
pub use error::OrchestratorError;
pub use leader::{LEADER_AGENT, Leader, LeaderAgent};
pub use llm::{
    ChatClient, ChatRequest, ChatResponse, LlmError, StopReason, StreamCallback, Usage,
    create_chat_client,
};
pub use registry::{AgentCtor, AgentProfile, AgentRegistry};
pub use room::ChatRoom;
pub use session::ChatSession;
