//! File read tool — full or ranged reads with workspace scoping.

use async_trait::async_trait;
use quill_core::error::ToolError;
use quill_core::tool::{Tool, ToolResult};

use crate::workspace::Workspace;

/// Files larger than this require a line range.
const MAX_WHOLE_FILE_BYTES: u64 = 500_000;

pub struct ReadFileTool {
    workspace: Workspace,
}

impl ReadFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Pass line_start/line_end (1-based, inclusive) to read a range; required for large files."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read, relative to the workspace root"
                },
                "line_start": {
                    "type": "integer",
                    "description": "First line to read (1-based)"
                },
                "line_end": {
                    "type": "integer",
                    "description": "Last line to read (inclusive)"
                }
            },
            "required": ["path"]
        })
    }

    fn parallel_safe(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let line_start = arguments["line_start"].as_u64().map(|v| v as usize);
        let line_end = arguments["line_end"].as_u64().map(|v| v as usize);

        let resolved = self.workspace.resolve(path)?;

        let metadata = match tokio::fs::metadata(&resolved).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::NotFound(path.into()));
            }
            Err(e) => return Err(ToolError::Io(e.to_string())),
        };

        if metadata.is_dir() {
            return Err(ToolError::InvalidArguments(format!(
                "'{path}' is a directory; use list_dir"
            )));
        }

        if metadata.len() > MAX_WHOLE_FILE_BYTES && line_start.is_none() {
            return Err(ToolError::InvalidArguments(format!(
                "'{path}' is {} bytes; pass line_start/line_end, or use search_file to locate the relevant section first",
                metadata.len()
            )));
        }

        let content = match tokio::fs::read_to_string(&resolved).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(ToolError::PermissionDenied(path.into()));
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(ToolError::Io(format!(
                    "'{path}' is not valid UTF-8 text"
                )));
            }
            Err(e) => return Err(ToolError::Io(e.to_string())),
        };

        let Some(start) = line_start else {
            return Ok(ToolResult::ok("", content));
        };

        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len();

        if start == 0 {
            return Err(ToolError::InvalidArguments(
                "line_start is 1-based".into(),
            ));
        }
        if start > total {
            return Err(ToolError::OutOfRange {
                requested: start,
                available: total,
            });
        }

        let requested_end = line_end.unwrap_or(total).max(start);
        let end = requested_end.min(total);
        let selected = lines[start - 1..end].join("\n");

        // A range past EOF is served truncated, with a notice, so the
        // model can adapt instead of hard-failing.
        let output = if requested_end > total {
            format!(
                "{selected}\n[requested lines {start}-{requested_end}, file ends at line {total}]"
            )
        } else {
            selected
        };

        Ok(ToolResult::ok_with_data(
            "",
            output,
            serde_json::json!({ "lines": format!("{start}-{end}"), "total_lines": total }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(content: &str) -> (tempfile::TempDir, ReadFileTool) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.txt"), content).unwrap();
        let tool = ReadFileTool::new(Workspace::new(dir.path()));
        (dir, tool)
    }

    #[tokio::test]
    async fn read_whole_file() {
        let (_dir, tool) = fixture("hello\nworld\n");
        let result = tool
            .execute(serde_json::json!({"path": "file.txt"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "hello\nworld\n");
    }

    #[tokio::test]
    async fn read_line_range() {
        let content = (1..=15).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let (_dir, tool) = fixture(&content);

        let result = tool
            .execute(serde_json::json!({"path": "file.txt", "line_start": 3, "line_end": 5}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "line 3\nline 4\nline 5");
    }

    #[tokio::test]
    async fn range_past_eof_truncates_with_notice() {
        let content = (1..=15).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let (_dir, tool) = fixture(&content);

        let result = tool
            .execute(serde_json::json!({"path": "file.txt", "line_start": 10, "line_end": 20}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("line 10"));
        assert!(result.output.contains("line 15"));
        assert!(!result.output.contains("line 16"));
        assert!(result.output.contains("file ends at line 15"));
    }

    #[tokio::test]
    async fn start_past_eof_is_out_of_range() {
        let (_dir, tool) = fixture("one\ntwo\n");
        let err = tool
            .execute(serde_json::json!({"path": "file.txt", "line_start": 10}))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ToolError::OutOfRange {
                requested: 10,
                available: 2
            }
        );
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let (_dir, tool) = fixture("x");
        let err = tool
            .execute(serde_json::json!({"path": "absent.txt"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let tool = ReadFileTool::new(Workspace::new(dir.path()));

        let err = tool
            .execute(serde_json::json!({"path": "sub"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn large_file_requires_range() {
        let dir = tempfile::tempdir().unwrap();
        let big = "x".repeat(600_000);
        std::fs::write(dir.path().join("big.txt"), &big).unwrap();
        let tool = ReadFileTool::new(Workspace::new(dir.path()));

        let err = tool
            .execute(serde_json::json!({"path": "big.txt"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(err.to_string().contains("search_file"));

        // With a range it reads fine
        let result = tool
            .execute(serde_json::json!({"path": "big.txt", "line_start": 1, "line_end": 1}))
            .await
            .unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn missing_path_argument() {
        let (_dir, tool) = fixture("x");
        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn escape_blocked() {
        let (_dir, tool) = fixture("x");
        let err = tool
            .execute(serde_json::json!({"path": "../../etc/passwd"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied(_)));
    }
}
