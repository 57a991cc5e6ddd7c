//! Surgical patch tool — exact find/replace or single-line replacement.
//!
//! The find/replace variant requires the find text to occur exactly once;
//! an ambiguous match must never silently pick one occurrence.

use async_trait::async_trait;
use quill_core::error::ToolError;
use quill_core::tool::{Tool, ToolResult};

use crate::workspace::Workspace;

pub struct PatchFileTool {
    workspace: Workspace,
}

impl PatchFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    async fn read(&self, path: &str) -> Result<(std::path::PathBuf, String), ToolError> {
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
        Ok((resolved, content))
    }

    fn apply_find_replace(
        content: &str,
        find: &str,
        replace: &str,
    ) -> Result<String, ToolError> {
        if find.is_empty() {
            return Err(ToolError::InvalidArguments("'find' must not be empty".into()));
        }
        match content.matches(find).count() {
            0 => Err(ToolError::NoMatch),
            1 => Ok(content.replacen(find, replace, 1)),
            count => Err(ToolError::AmbiguousMatch { count }),
        }
    }

    fn apply_line_patch(
        content: &str,
        line: usize,
        new_content: &str,
    ) -> Result<String, ToolError> {
        let had_trailing_newline = content.ends_with('\n');
        let mut lines: Vec<&str> = content.lines().collect();

        if line == 0 {
            return Err(ToolError::InvalidArguments("'line' is 1-based".into()));
        }
        if line > lines.len() {
            return Err(ToolError::OutOfRange {
                requested: line,
                available: lines.len(),
            });
        }

        lines[line - 1] = new_content;
        let mut patched = lines.join("\n");
        if had_trailing_newline {
            patched.push('\n');
        }
        Ok(patched)
    }
}

#[async_trait]
impl Tool for PatchFileTool {
    fn name(&self) -> &str {
        "patch_file"
    }

    fn description(&self) -> &str {
        "Surgically edit a file. Either pass find/replace (the find text must occur exactly once) or line/new_content to replace one line (1-based)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to patch, relative to the workspace root"
                },
                "find": {
                    "type": "string",
                    "description": "Exact text to find (must occur exactly once)"
                },
                "replace": {
                    "type": "string",
                    "description": "Replacement text for the find variant"
                },
                "line": {
                    "type": "integer",
                    "description": "Line number to replace (1-based), for the line variant"
                },
                "new_content": {
                    "type": "string",
                    "description": "Replacement line for the line variant"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let (resolved, content) = self.read(path).await?;

        let (patched, summary) = if let Some(find) = arguments["find"].as_str() {
            let replace = arguments["replace"].as_str().ok_or_else(|| {
                ToolError::InvalidArguments("'find' requires 'replace'".into())
            })?;
            let patched = Self::apply_find_replace(&content, find, replace)?;
            (patched, format!("Patched {path} (1 replacement)"))
        } else if let Some(line) = arguments["line"].as_u64() {
            let new_content = arguments["new_content"].as_str().ok_or_else(|| {
                ToolError::InvalidArguments("'line' requires 'new_content'".into())
            })?;
            let patched = Self::apply_line_patch(&content, line as usize, new_content)?;
            (patched, format!("Patched {path} (line {line})"))
        } else {
            return Err(ToolError::InvalidArguments(
                "pass either find/replace or line/new_content".into(),
            ));
        };

        match tokio::fs::write(&resolved, patched).await {
            Ok(()) => Ok(ToolResult::ok("", summary)),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Err(ToolError::PermissionDenied(path.into()))
            }
            Err(e) => Err(ToolError::Io(e.to_string())),
        }
    }
}
