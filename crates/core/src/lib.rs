//! # Quill Core
//!
//! Domain types, traits, and error definitions for the quill terminal agent.
//! This crate has **zero framework dependencies** — it defines the domain
//! model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod abort;
pub mod backend;
pub mod error;
pub mod event;
pub mod session;
pub mod todo;
pub mod tool;
pub mod turn;

// Re-export key types at crate root for ergonomics
pub use abort::AbortSignal;
pub use backend::{BackendRequest, ModeFlags, ModelBackend, ModelTurn, TurnFragment, Usage};
pub use error::{BackendError, Error, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use session::{AbortReason, Session, SessionId, SessionSnapshot, SessionStatus};
pub use todo::{TodoHandle, TodoItem, TodoList, TodoStatus};
pub use tool::{Tool, ToolCall, ToolDefinition, ToolRegistry, ToolResult};
pub use turn::{Role, Turn, TurnToolCall};
