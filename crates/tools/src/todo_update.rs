//! TODO tool — the only mutator of the session task list.
//!
//! Operations apply atomically; the result always carries the list
//! snapshot so the model sees the current plan state.

use async_trait::async_trait;
use quill_core::error::ToolError;
use quill_core::todo::{TodoHandle, TodoStatus};
use quill_core::tool::{Tool, ToolResult};

pub struct TodoUpdateTool {
    todos: TodoHandle,
}

impl TodoUpdateTool {
    pub fn new(todos: TodoHandle) -> Self {
        Self { todos }
    }
}

fn require_id(arguments: &serde_json::Value) -> Result<u64, ToolError> {
    arguments["id"]
        .as_u64()
        .ok_or_else(|| ToolError::InvalidArguments("Missing 'id' argument".into()))
}

#[async_trait]
impl Tool for TodoUpdateTool {
    fn name(&self) -> &str {
        "todo_update"
    }

    fn description(&self) -> &str {
        "Manage the session task list. Operations: add (description or descriptions list), update (id plus status pending/in_progress/done and/or description), remove (id), reorder (id plus 1-based position). Use this to plan multi-step work and track progress."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["add", "update", "remove", "reorder"],
                    "description": "The mutation to apply"
                },
                "description": {
                    "type": "string",
                    "description": "Task description (add), or replacement description (update)"
                },
                "descriptions": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Multiple task descriptions for add"
                },
                "id": {
                    "type": "integer",
                    "description": "Task id (update/remove/reorder)"
                },
                "status": {
                    "type": "string",
                    "enum": ["pending", "in_progress", "done"],
                    "description": "New status (update)"
                },
                "position": {
                    "type": "integer",
                    "description": "Target 1-based position (reorder)"
                }
            },
            "required": ["operation"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let operation = arguments["operation"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'operation' argument".into()))?;

        let mut todos = self.todos.lock().expect("todo lock poisoned");

        match operation {
            "add" => {
                let mut added = 0usize;
                if let Some(list) = arguments["descriptions"].as_array() {
                    for item in list {
                        if let Some(text) = item.as_str()
                            && !text.trim().is_empty()
                        {
                            todos.add(text.trim());
                            added += 1;
                        }
                    }
                }
                if let Some(text) = arguments["description"].as_str()
                    && !text.trim().is_empty()
                {
                    todos.add(text.trim());
                    added += 1;
                }
                if added == 0 {
                    return Err(ToolError::InvalidArguments(
                        "add needs 'description' or a non-empty 'descriptions' list".into(),
                    ));
                }
            }
            "update" => {
                let id = require_id(&arguments)?;
                let status = match arguments["status"].as_str() {
                    Some(raw) => Some(TodoStatus::parse(raw).ok_or_else(|| {
                        ToolError::InvalidArguments(format!(
                            "status must be pending, in_progress, or done, got '{raw}'"
                        ))
                    })?),
                    None => None,
                };
                let description = arguments["description"].as_str().map(String::from);
                if status.is_none() && description.is_none() {
                    return Err(ToolError::InvalidArguments(
                        "update needs 'status' and/or 'description'".into(),
                    ));
                }
                todos.update(id, status, description)?;
            }
            "remove" => {
                let id = require_id(&arguments)?;
                todos.remove(id)?;
            }
            "reorder" => {
                let id = require_id(&arguments)?;
                let position = arguments["position"].as_u64().ok_or_else(|| {
                    ToolError::InvalidArguments("Missing 'position' argument".into())
                })? as usize;
                todos.reorder(id, position)?;
            }
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "unknown operation '{other}'"
                )));
            }
        }

        let snapshot = todos.render();
        let items = serde_json::to_value(todos.items()).unwrap_or_default();
        Ok(ToolResult::ok_with_data("", snapshot, items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::todo::new_handle;

    fn tool_with_handle() -> (TodoHandle, TodoUpdateTool) {
        let handle = new_handle();
        let tool = TodoUpdateTool::new(handle.clone());
        (handle, tool)
    }

    #[tokio::test]
    async fn add_multiple_returns_snapshot() {
        let (handle, tool) = tool_with_handle();
        let result = tool
            .execute(serde_json::json!({
                "operation": "add",
                "descriptions": ["read the config", "fix the bug", "run tests"]
            }))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("1. [ ] read the config"));
        assert!(result.output.contains("3. [ ] run tests"));
        assert_eq!(handle.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn update_status_reflected_in_snapshot() {
        let (handle, tool) = tool_with_handle();
        let id = handle.lock().unwrap().add("task");

        let result = tool
            .execute(serde_json::json!({"operation": "update", "id": id, "status": "done"}))
            .await
            .unwrap();
        assert!(result.output.contains("[x] task"));
    }

    #[tokio::test]
    async fn remove_and_reorder() {
        let (handle, tool) = tool_with_handle();
        let (a, b) = {
            let mut todos = handle.lock().unwrap();
            (todos.add("a"), todos.add("b"))
        };

        tool.execute(serde_json::json!({"operation": "reorder", "id": b, "position": 1}))
            .await
            .unwrap();
        assert_eq!(handle.lock().unwrap().items()[0].id, b);

        tool.execute(serde_json::json!({"operation": "remove", "id": a}))
            .await
            .unwrap();
        assert_eq!(handle.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_operation_rejected() {
        let (_handle, tool) = tool_with_handle();
        let err = tool
            .execute(serde_json::json!({"operation": "clear"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn add_without_descriptions_rejected() {
        let (handle, tool) = tool_with_handle();
        let err = tool
            .execute(serde_json::json!({"operation": "add"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(handle.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let (_handle, tool) = tool_with_handle();
        let err = tool
            .execute(serde_json::json!({"operation": "update", "id": 42, "status": "done"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn bad_status_rejected() {
        let (handle, tool) = tool_with_handle();
        let id = handle.lock().unwrap().add("task");
        let err = tool
            .execute(serde_json::json!({"operation": "update", "id": id, "status": "finished"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
