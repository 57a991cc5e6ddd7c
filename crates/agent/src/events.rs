//! Agent-level streaming events.
//!
//! `AgentStreamEvent` wraps backend fragments and executor results into
//! higher-level events a rendering layer can consume live. The core never
//! renders; it only emits.

use quill_core::backend::Usage;
use serde::{Deserialize, Serialize};

/// Events emitted by the agent loop during execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// Partial text from the model.
    Chunk { content: String },

    /// Partial deliberation text (reasoning mode).
    Reasoning { content: String },

    /// The agent is about to execute a tool call.
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },

    /// Tool execution completed.
    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// The session reached a terminal state.
    Done {
        session_id: String,
        outcome: String,
        usage: Option<Usage>,
        turns: u32,
        tool_calls_made: usize,
    },

    /// An error occurred mid-session.
    Error { message: String },
}

impl AgentStreamEvent {
    /// Wire event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::Reasoning { .. } => "reasoning",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}
