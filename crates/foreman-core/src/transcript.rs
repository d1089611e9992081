// ABOUTME: Transcript entry type for the per-request chat room message bus.
// ABOUTME: Entries are append-only and tagged with sender and recipient agent names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::ChatRole;

/// One recorded exchange in a chat room, scoped to a single request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: ChatRole,
    pub from_agent: String,
    pub to_agent: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    /// Create an entry stamped with the current time.
    pub fn new(
        role: ChatRole,
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role,
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}
