//! Conversation transcript exchanged with model backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::stage::Stage;

/// Speaker of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call exactly as the model phrased it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Result of one tool call, relayed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultRecord {
    pub call_id: String,
    pub tool_name: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResultRecord {
    pub fn ok(call: &ToolCall, output: &Value) -> Self {
        let content = match output {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            content,
            is_error: false,
        }
    }

    pub fn error(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            content: message.into(),
            is_error: true,
        }
    }
}

/// One turn of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResultRecord>,
}

impl ConversationTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(TurnRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(TurnRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(TurnRole::Assistant, content)
    }

    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            tool_calls: calls,
            tool_results: Vec::new(),
        }
    }

    pub fn tool_results(results: Vec<ToolResultRecord>) -> Self {
        Self {
            role: TurnRole::Tool,
            content: String::new(),
            tool_calls: Vec::new(),
            tool_results: results,
        }
    }

    fn text(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }
}

/// Where a tool call came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub stage: Stage,
    pub agent: String,
    pub run_id: Uuid,
}

/// A tool call bound to its originating agent run.
///
/// `id` is unique per request and is what approvals are keyed on. `call_id`
/// is the model's own identifier, echoed back in the tool result; backends
/// may reuse it across turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub origin: Origin,
    pub requested_at: DateTime<Utc>,
}

impl ToolCallRequest {
    /// Bind a model call to its origin. Calls without an id get a fresh one.
    pub fn from_call(call: &ToolCall, origin: Origin, now: DateTime<Utc>) -> Self {
        let call_id = if call.id.trim().is_empty() {
            format!("call_{}", Uuid::new_v4().simple())
        } else {
            call.id.clone()
        };
        Self {
            id: format!("req_{}", Uuid::new_v4().simple()),
            call_id,
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            origin,
            requested_at: now,
        }
    }

    /// The request in the model's own vocabulary.
    pub fn as_call(&self) -> ToolCall {
        ToolCall {
            id: self.call_id.clone(),
            name: self.tool_name.clone(),
            arguments: self.arguments.clone(),
        }
    }
}
