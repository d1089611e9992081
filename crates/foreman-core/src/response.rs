// ABOUTME: Uniform success/error result envelope for tool and task execution.
// ABOUTME: Exactly one of value/error is meaningful depending on status; supports flat-record serialization.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Outcome status of a tool or task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Error,
}

/// The uniform result envelope returned by any tool-augmented execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub status: TaskStatus,
    pub value: Option<Value>,
    pub error: Option<String>,
}

/// Task execution uses the same envelope as tool execution.
pub type TaskResponse = ToolResponse;

impl ToolResponse {
    /// Create a success envelope carrying a value.
    pub fn success(value: impl Into<Value>) -> Self {
        Self {
            status: TaskStatus::Success,
            value: Some(value.into()),
            error: None,
        }
    }

    /// Create an error envelope carrying a message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Error,
            value: None,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == TaskStatus::Error
    }

    /// The carried value as display text. Error envelopes yield their
    /// error message so transcripts always have something to record.
    pub fn display_text(&self) -> String {
        match self.status {
            TaskStatus::Success => match &self.value {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            },
            TaskStatus::Error => self
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
        }
    }

    /// Flat record form for logging and transport.
    pub fn to_record(&self) -> Value {
        json!({
            "status": self.status,
            "value": self.value,
            "error": self.error,
        })
    }
}
