//! Turn types — the building blocks of a session transcript.
//!
//! A `Turn` is one message in the conversation. Turns are immutable once
//! appended; the `Session` owns the append-only ordered sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// Synthetic instructions (seeded prompt, corrective turns)
    System,
    /// Tool execution result
    Tool,
}

/// A tool call as emitted by a backend, before parsing/validation.
///
/// Arguments are kept as the raw JSON string; the parser turns this into a
/// validated [`crate::tool::ToolCall`] or a failure result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnToolCall {
    /// Call identifier, unique within the originating turn
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON string
    pub arguments: String,
}

/// A single turn in a session transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: String,

    /// Who authored this turn
    pub role: Role,

    /// The text content
    pub content: String,

    /// Internal deliberation segment, surfaced separately in reasoning mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<TurnToolCall>,

    /// If this is a tool-result turn, which call it answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    fn base(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            reasoning: None,
            tool_calls: Vec::new(),
            call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::base(Role::User, content)
    }

    /// Create a new assistant turn with plain text only.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::base(Role::Assistant, content)
    }

    /// Create an assistant turn carrying tool calls (and possibly reasoning).
    pub fn assistant_with_calls(
        content: impl Into<String>,
        reasoning: Option<String>,
        tool_calls: Vec<TurnToolCall>,
    ) -> Self {
        let mut turn = Self::base(Role::Assistant, content);
        turn.reasoning = reasoning;
        turn.tool_calls = tool_calls;
        turn
    }

    /// Create a new system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self::base(Role::System, content)
    }

    /// Create a tool-result turn answering `call_id`.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut turn = Self::base(Role::Tool, content);
        turn.call_id = Some(call_id.into());
        turn
    }

    /// Whether this assistant turn requests any tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_turn() {
        let turn = Turn::user("Hello, agent!");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.content, "Hello, agent!");
        assert!(turn.tool_calls.is_empty());
        assert!(turn.call_id.is_none());
    }

    #[test]
    fn tool_result_references_call() {
        let turn = Turn::tool_result("call_0", "done");
        assert_eq!(turn.role, Role::Tool);
        assert_eq!(turn.call_id.as_deref(), Some("call_0"));
    }

    #[test]
    fn turn_serialization_roundtrip() {
        let turn = Turn::assistant_with_calls(
            "on it",
            Some("let me check the file first".into()),
            vec![TurnToolCall {
                id: "call_0".into(),
                name: "read_file".into(),
                arguments: r#"{"path":"src/main.rs"}"#.into(),
            }],
        );
        let json = serde_json::to_string(&turn).unwrap();
        let back: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role, Role::Assistant);
        assert_eq!(back.tool_calls.len(), 1);
        assert_eq!(back.tool_calls[0].name, "read_file");
        assert!(back.reasoning.is_some());
    }

    #[test]
    fn plain_turn_omits_empty_fields() {
        let json = serde_json::to_string(&Turn::user("hi")).unwrap();
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("reasoning"));
        assert!(!json.contains("call_id"));
    }
}
