// ABOUTME: Built-in agents shipped with the runtime.
// ABOUTME: GeneralAgent is a tool-less generalist so a bare install can still answer requests.

use crate::agent::{Agent, role_from_type_name};

/// General-purpose assistant with no tools. Registered by default so
/// the planner always has at least one delegate available.
pub struct GeneralAgent;

impl GeneralAgent {
    pub const NAME: &'static str = "general";
}

impl Agent for GeneralAgent {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn backstory(&self) -> String {
        "A capable generalist. Answers questions, drafts text, and reasons through problems \
         that need no specialist tooling."
            .to_string()
    }

    fn role(&self) -> String {
        role_from_type_name(std::any::type_name::<Self>())
    }
}
