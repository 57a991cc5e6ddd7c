//! Session state — the owned, passed-by-reference conversation.
//!
//! A session owns the append-only turn transcript, the TODO list handle,
//! the active backend/model selection, and the mode flags. It is mutated
//! only by the orchestrator; nothing here is ambient global state, so
//! multiple independent sessions can coexist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::ModeFlags;
use crate::todo::{self, TodoHandle, TodoItem};
use crate::turn::{Role, Turn};

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a session was aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    /// The turn cap was reached
    BudgetExceeded { max_turns: u32 },
    /// The user interrupted the session
    UserCancelled,
}

/// Terminal state of a session run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Completed,
    Aborted(AbortReason),
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Aborted(AbortReason::BudgetExceeded { max_turns }) => {
                write!(f, "aborted: turn cap of {max_turns} reached")
            }
            Self::Aborted(AbortReason::UserCancelled) => write!(f, "aborted: cancelled by user"),
        }
    }
}

/// A live session.
pub struct Session {
    /// Unique session ID
    pub id: SessionId,

    /// Ordered, append-only transcript
    turns: Vec<Turn>,

    /// Shared TODO list, mutated only via the todo_update tool
    todos: TodoHandle,

    /// Name of the active backend
    pub backend: String,

    /// The selected model
    pub model: String,

    /// Active mode flags
    pub flags: ModeFlags,

    /// When this session was created
    pub created_at: DateTime<Utc>,

    /// When the last turn was appended
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new empty session on the given backend and model.
    pub fn new(backend: impl Into<String>, model: impl Into<String>, flags: ModeFlags) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            turns: Vec::new(),
            todos: todo::new_handle(),
            backend: backend.into(),
            model: model.into(),
            flags,
            created_at: now,
            updated_at: now,
        }
    }

    /// Share an existing TODO handle (the one the tool registry mutates)
    /// instead of the fresh list created by `new`.
    pub fn with_todos(mut self, todos: TodoHandle) -> Self {
        self.todos = todos;
        self
    }

    /// Append a turn to the transcript.
    pub fn push(&mut self, turn: Turn) {
        self.updated_at = Utc::now();
        self.turns.push(turn);
    }

    /// The full transcript.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Seed the system prompt if the transcript does not start with one.
    pub fn ensure_system(&mut self, prompt: &str) {
        if !self.turns.iter().any(|t| t.role == Role::System) {
            self.turns.insert(0, Turn::system(prompt));
            self.updated_at = Utc::now();
        }
    }

    /// A trimmed view for the backend request: all system turns plus the
    /// most recent `max_turns` non-system turns. The stored transcript is
    /// never trimmed.
    pub fn context_window(&self, max_turns: usize) -> Vec<Turn> {
        let non_system = self.turns.iter().filter(|t| t.role != Role::System).count();
        if non_system <= max_turns {
            return self.turns.clone();
        }
        let mut skip = non_system - max_turns;
        self.turns
            .iter()
            .filter(|t| {
                if t.role == Role::System {
                    true
                } else if skip > 0 {
                    skip -= 1;
                    false
                } else {
                    true
                }
            })
            .cloned()
            .collect()
    }

    /// Shared handle to the TODO list.
    pub fn todos(&self) -> TodoHandle {
        self.todos.clone()
    }

    /// Read-only snapshot of the TODO items for rendering.
    pub fn todo_snapshot(&self) -> Vec<TodoItem> {
        self.todos.lock().expect("todo lock poisoned").items().to_vec()
    }

    /// Tool-call ids in the transcript that have no matching tool-result
    /// turn yet. Must be empty before every backend invocation.
    pub fn dangling_call_ids(&self) -> Vec<String> {
        let resolved: std::collections::HashSet<&str> = self
            .turns
            .iter()
            .filter_map(|t| t.call_id.as_deref())
            .collect();
        self.turns
            .iter()
            .flat_map(|t| t.tool_calls.iter())
            .filter(|c| !resolved.contains(c.id.as_str()))
            .map(|c| c.id.clone())
            .collect()
    }

    /// Get the total token count estimate (rough: 4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.turns.iter().map(|t| t.content.len() / 4).sum()
    }

    /// Clear the transcript and TODO list, keeping backend and flags.
    pub fn reset(&mut self) {
        self.turns.clear();
        self.todos.lock().expect("todo lock poisoned").clear();
        self.id = SessionId::new();
        self.updated_at = Utc::now();
    }

    /// Serializable snapshot for an external persistence collaborator.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            turns: self.turns.clone(),
            todos: self.todo_snapshot(),
            backend: self.backend.clone(),
            model: self.model.clone(),
            flags: self.flags,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A point-in-time serializable view of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub turns: Vec<Turn>,
    pub todos: Vec<TodoItem>,
    pub backend: String,
    pub model: String,
    pub flags: ModeFlags,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
