//! ModelBackend trait — the abstraction over model providers.
//!
//! A backend knows how to send a transcript (plus tool definitions and mode
//! flags) to a model and get a turn back, either complete or as a stream of
//! fragments. Implementations: remote OpenAI-compatible services, a local
//! inference service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::turn::{Turn, TurnToolCall};

/// Session mode flags passed through to the backend and the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeFlags {
    /// Ask the model to emit an internal deliberation segment before its
    /// final answer, surfaced separately so it can be hidden or shown.
    #[serde(default)]
    pub reasoning: bool,

    /// Require an initial TODO-list plan before any other tool call.
    #[serde(default)]
    pub planning: bool,

    /// Nudge the model to think more carefully and check its own work.
    #[serde(default)]
    pub verbose: bool,
}

/// Configuration for a backend request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendRequest {
    /// The model to use
    pub model: String,

    /// The transcript window to send
    pub turns: Vec<Turn>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<crate::tool::ToolDefinition>,

    /// Active mode flags
    #[serde(default)]
    pub flags: ModeFlags,
}

fn default_temperature() -> f32 {
    0.7
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete (non-streaming) model turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTurn {
    /// The generated text content
    pub text: String,

    /// Deliberation segment, when the backend surfaced one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Structured tool calls, when the backend natively emits them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<TurnToolCall>,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// A single fragment in a streamed model turn.
///
/// Fragments are a finite, non-restartable sequence terminated by a
/// fragment with `done` set; tool calls and usage arrive on that final
/// fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnFragment {
    /// Partial text delta
    #[serde(default)]
    pub text: Option<String>,

    /// Partial reasoning delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Accumulated tool calls (final fragment only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<TurnToolCall>,

    /// Whether this is the final fragment
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only on the final fragment)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// The core ModelBackend trait.
///
/// Every model provider (remote service, local inference) implements this
/// trait. The agent loop calls `send()` or `stream()` without knowing which
/// backend is active — pure polymorphism.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// A human-readable name for this backend (e.g., "remote", "local").
    fn name(&self) -> &str;

    /// Send a request and get a complete turn.
    async fn send(
        &self,
        request: BackendRequest,
    ) -> std::result::Result<ModelTurn, BackendError>;

    /// Send a request and get a stream of turn fragments.
    ///
    /// Default implementation calls `send()` and wraps the result as a
    /// single done fragment.
    async fn stream(
        &self,
        request: BackendRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<TurnFragment, BackendError>>,
        BackendError,
    > {
        let turn = self.send(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(TurnFragment {
                text: Some(turn.text),
                reasoning: turn.reasoning,
                tool_calls: turn.tool_calls,
                done: true,
                usage: turn.usage,
            }))
            .await;
        Ok(rx)
    }

    /// List available models for this backend.
    async fn list_models(&self) -> std::result::Result<Vec<String>, BackendError> {
        Ok(Vec::new())
    }

    /// Health check — can we reach the backend?
    async fn health_check(&self) -> std::result::Result<bool, BackendError> {
        Ok(true)
    }
}
