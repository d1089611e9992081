// ABOUTME: AgentRegistry maps agent names to constructors and instantiates them on demand.
// ABOUTME: An explicit value passed where needed; cloning snapshots the table for tests.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::agent::{Agent, AgentParams};
use crate::error::OrchestratorError;
use crate::leader::LEADER_AGENT;

/// Builds a fresh agent instance from shared construction params.
pub type AgentCtor =
    Arc<dyn Fn(AgentParams) -> Result<Box<dyn Agent>, OrchestratorError> + Send + Sync>;

/// A planner-facing capability advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProfile {
    pub name: String,
    pub backstory: String,
}

/// Name → constructor table. Registration order is preserved so the
/// planner catalog reads the same way every run.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    order: Vec<String>,
    ctors: HashMap<String, AgentCtor>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under `name`. Re-registering a name
    /// replaces the previous constructor in place.
    pub fn register(&mut self, name: impl Into<String>, ctor: AgentCtor) {
        let name = name.into();
        if !self.ctors.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.ctors.insert(name, ctor);
    }

    pub fn find(&self, name: &str) -> Option<&AgentCtor> {
        self.ctors.get(Self::canonical(name))
    }

    pub fn remove(&mut self, name: &str) -> Option<AgentCtor> {
        let name = Self::canonical(name);
        self.order.retain(|n| n != name);
        self.ctors.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ctors.contains_key(Self::canonical(name))
    }

    pub fn len(&self) -> usize {
        self.ctors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ctors.is_empty()
    }

    /// "leader" always resolves to the canonical leader registration.
    fn canonical(name: &str) -> &str {
        if name.eq_ignore_ascii_case("leader") {
            LEADER_AGENT
        } else {
            name
        }
    }

    /// Build a new instance of the named agent.
    pub fn instantiate(
        &self,
        name: &str,
        params: AgentParams,
    ) -> Result<Box<dyn Agent>, OrchestratorError> {
        let ctor = self
            .find(name)
            .ok_or_else(|| OrchestratorError::AgentNotFound(name.to_string()))?;
        ctor(params)
    }

    /// Capability advertisements for every enabled agent, in
    /// registration order. A constructor that fails here is logged and
    /// skipped rather than sinking the whole catalog.
    pub fn list_enabled(&self) -> Vec<AgentProfile> {
        self.order
            .iter()
            .filter_map(|name| {
                let ctor = &self.ctors[name];
                match ctor(AgentParams::default()) {
                    Ok(agent) if agent.enabled() => Some(AgentProfile {
                        name: agent.name().to_string(),
                        backstory: agent.backstory(),
                    }),
                    Ok(_) => None,
                    Err(e) => {
                        warn!(agent = %name, error = %e, "skipping agent with failing constructor");
                        None
                    }
                }
            })
            .collect()
    }
}
