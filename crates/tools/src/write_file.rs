//! File write tool — overwrite or append with workspace scoping.

use async_trait::async_trait;
use quill_core::error::ToolError;
use quill_core::tool::{Tool, ToolResult};
use tokio::io::AsyncWriteExt;

use crate::workspace::Workspace;

pub struct WriteFileTool {
    workspace: Workspace,
}

impl WriteFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

fn map_io(path: &str, e: std::io::Error) -> ToolError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        ToolError::PermissionDenied(path.into())
    } else {
        ToolError::Io(e.to_string())
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file and any parent directories. Mode 'overwrite' (default) replaces the file, 'append' adds to the end."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write to, relative to the workspace root"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                },
                "mode": {
                    "type": "string",
                    "enum": ["overwrite", "append"],
                    "description": "Write mode, defaults to overwrite"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;
        let mode = arguments["mode"].as_str().unwrap_or("overwrite");
        if mode != "overwrite" && mode != "append" {
            return Err(ToolError::InvalidArguments(format!(
                "mode must be 'overwrite' or 'append', got '{mode}'"
            )));
        }

        let resolved = self.workspace.resolve(path)?;

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(path, e))?;
        }

        if mode == "append" {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&resolved)
                .await
                .map_err(|e| map_io(path, e))?;
            file.write_all(content.as_bytes())
                .await
                .map_err(|e| map_io(path, e))?;
            file.flush().await.map_err(|e| map_io(path, e))?;
        } else {
            tokio::fs::write(&resolved, content)
                .await
                .map_err(|e| map_io(path, e))?;
        }

        Ok(ToolResult::ok(
            "",
            format!("Wrote {} bytes to {path} ({mode})", content.len()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_in(dir: &tempfile::TempDir) -> WriteFileTool {
        WriteFileTool::new(Workspace::new(dir.path()))
    }

    #[tokio::test]
    async fn write_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(&dir);

        let result = tool
            .execute(serde_json::json!({"path": "output.txt", "content": "Hello from test!"}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("16 bytes"));

        let content = std::fs::read_to_string(dir.path().join("output.txt")).unwrap();
        assert_eq!(content, "Hello from test!");
    }

    #[tokio::test]
    async fn write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(&dir);

        let result = tool
            .execute(serde_json::json!({"path": "nested/dir/file.txt", "content": "nested"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("nested/dir/file.txt")).unwrap(),
            "nested"
        );
    }

    #[tokio::test]
    async fn overwrite_replaces() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "old content").unwrap();
        let tool = tool_in(&dir);

        tool.execute(serde_json::json!({"path": "f.txt", "content": "new"}))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "new");
    }

    #[tokio::test]
    async fn append_adds_to_end() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("log.txt"), "first\n").unwrap();
        let tool = tool_in(&dir);

        tool.execute(
            serde_json::json!({"path": "log.txt", "content": "second\n", "mode": "append"}),
        )
        .await
        .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("log.txt")).unwrap(),
            "first\nsecond\n"
        );
    }

    #[tokio::test]
    async fn append_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(&dir);

        tool.execute(serde_json::json!({"path": "new.txt", "content": "x", "mode": "append"}))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("new.txt")).unwrap(), "x");
    }

    #[tokio::test]
    async fn bad_mode_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(&dir);
        let err = tool
            .execute(serde_json::json!({"path": "f.txt", "content": "x", "mode": "truncate"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn missing_content_argument() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(&dir);
        let err = tool
            .execute(serde_json::json!({"path": "f.txt"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn escape_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(&dir);
        let err = tool
            .execute(serde_json::json!({"path": "../evil.txt", "content": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied(_)));
    }
}
