//! File search tool — case-insensitive substring scan.
//!
//! The companion to ranged reads for large files: locate the relevant
//! lines first, then read the surrounding range.

use async_trait::async_trait;
use quill_core::error::ToolError;
use quill_core::tool::{Tool, ToolResult};

use crate::workspace::Workspace;

const MAX_MATCHES: usize = 50;
const MAX_LINE_CHARS: usize = 200;

pub struct SearchFileTool {
    workspace: Workspace,
}

impl SearchFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for SearchFileTool {
    fn name(&self) -> &str {
        "search_file"
    }

    fn description(&self) -> &str {
        "Search a file for a pattern (case-insensitive substring). Returns matching lines with their line numbers."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file to search, relative to the workspace root"
                },
                "pattern": {
                    "type": "string",
                    "description": "Substring to search for"
                }
            },
            "required": ["path", "pattern"]
        })
    }

    fn parallel_safe(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let pattern = arguments["pattern"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'pattern' argument".into()))?;
        if pattern.is_empty() {
            return Err(ToolError::InvalidArguments("'pattern' must not be empty".into()));
        }

        let resolved = self.workspace.resolve(path)?;
        let content = match tokio::fs::read_to_string(&resolved).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::NotFound(path.into()));
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(ToolError::PermissionDenied(path.into()));
            }
            Err(e) => return Err(ToolError::Io(e.to_string())),
        };

        let needle = pattern.to_lowercase();
        let mut matches = Vec::new();
        let mut total = 0usize;
        for (no, line) in content.lines().enumerate() {
            if line.to_lowercase().contains(&needle) {
                total += 1;
                if matches.len() < MAX_MATCHES {
                    let mut shown = line.to_string();
                    if shown.len() > MAX_LINE_CHARS {
                        shown.truncate(MAX_LINE_CHARS);
                        shown.push('…');
                    }
                    matches.push(format!("{}: {shown}", no + 1));
                }
            }
        }

        let output = if matches.is_empty() {
            "No matches".to_string()
        } else if total > matches.len() {
            format!(
                "{}\n... ({} more matches not shown)",
                matches.join("\n"),
                total - matches.len()
            )
        } else {
            matches.join("\n")
        };

        Ok(ToolResult::ok_with_data(
            "",
            output,
            serde_json::json!({ "match_count": total }),
        ))
    }
}
