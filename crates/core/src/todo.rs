//! The session TODO list.
//!
//! An ordered sequence of task items, mutated only through the dedicated
//! `todo_update` tool. Each operation either applies fully or fails without
//! touching the list.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// Lifecycle status of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Done,
}

impl TodoStatus {
    /// Parse the wire form used by the `todo_update` tool.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    fn marker(self) -> &'static str {
        match self {
            Self::Pending => "[ ]",
            Self::InProgress => "[~]",
            Self::Done => "[x]",
        }
    }
}

/// A single task. Ordinal position is the item's index in the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: u64,
    pub description: String,
    pub status: TodoStatus,
}

/// The ordered task list owned by a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoList {
    items: Vec<TodoItem>,
    next_id: u64,
}

/// Shared handle to a session's TODO list.
///
/// The session owns the list; the `todo_update` tool holds a clone of the
/// handle and is the only mutator. Lock scopes never cross an await point.
pub type TodoHandle = Arc<Mutex<TodoList>>;

impl TodoList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    /// Append a new pending item, returning its id.
    pub fn add(&mut self, description: impl Into<String>) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.items.push(TodoItem {
            id,
            description: description.into(),
            status: TodoStatus::Pending,
        });
        id
    }

    /// Update an item's status and/or description.
    pub fn update(
        &mut self,
        id: u64,
        status: Option<TodoStatus>,
        description: Option<String>,
    ) -> Result<(), ToolError> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| ToolError::NotFound(format!("todo item {id}")))?;
        if let Some(status) = status {
            item.status = status;
        }
        if let Some(description) = description {
            item.description = description;
        }
        Ok(())
    }

    /// Remove an item by id.
    pub fn remove(&mut self, id: u64) -> Result<(), ToolError> {
        let idx = self
            .items
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| ToolError::NotFound(format!("todo item {id}")))?;
        self.items.remove(idx);
        Ok(())
    }

    /// Move an item to a new 1-based position.
    pub fn reorder(&mut self, id: u64, position: usize) -> Result<(), ToolError> {
        if position == 0 || position > self.items.len() {
            return Err(ToolError::OutOfRange {
                requested: position,
                available: self.items.len(),
            });
        }
        let idx = self
            .items
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| ToolError::NotFound(format!("todo item {id}")))?;
        let item = self.items.remove(idx);
        self.items.insert(position - 1, item);
        Ok(())
    }

    /// Clear the list. Used by session reset.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Plain-text snapshot, one numbered line per item.
    pub fn render(&self) -> String {
        if self.items.is_empty() {
            return "(no tasks)".into();
        }
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                format!(
                    "{}. {} {} (id {})",
                    i + 1,
                    item.status.marker(),
                    item.description,
                    item.id
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Create a fresh shared TODO handle.
pub fn new_handle() -> TodoHandle {
    Arc::new(Mutex::new(TodoList::new()))
}
