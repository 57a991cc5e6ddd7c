//! Directory listing tool.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use quill_core::error::ToolError;
use quill_core::tool::{Tool, ToolResult};

use crate::workspace::Workspace;

const MAX_ENTRIES: usize = 500;
const MAX_DEPTH: usize = 5;

pub struct ListDirTool {
    workspace: Workspace,
}

impl ListDirTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

struct Entry {
    rel_path: String,
    is_dir: bool,
    size: u64,
}

fn collect_entries(root: &Path, recursive: bool) -> Result<(Vec<Entry>, bool), ToolError> {
    let max_depth = if recursive { MAX_DEPTH } else { 1 };
    let mut entries = Vec::new();
    let mut truncated = false;
    let mut queue: VecDeque<(PathBuf, usize)> = VecDeque::new();
    queue.push_back((root.to_path_buf(), 1));

    while let Some((dir, depth)) = queue.pop_front() {
        let read = match std::fs::read_dir(&dir) {
            Ok(r) => r,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => continue,
            Err(e) => return Err(ToolError::Io(e.to_string())),
        };

        let mut children: Vec<_> = read.filter_map(|e| e.ok()).collect();
        // Directories first, then by name
        children.sort_by_key(|e| {
            let is_dir = e.file_type().map(|t| t.is_dir()).unwrap_or(false);
            (!is_dir, e.file_name().to_string_lossy().to_lowercase())
        });

        for child in children {
            if entries.len() >= MAX_ENTRIES {
                truncated = true;
                return Ok((entries, truncated));
            }
            let path = child.path();
            let is_dir = child.file_type().map(|t| t.is_dir()).unwrap_or(false);
            let size = if is_dir {
                0
            } else {
                child.metadata().map(|m| m.len()).unwrap_or(0)
            };
            let rel_path = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .to_string();
            entries.push(Entry {
                rel_path,
                is_dir,
                size,
            });
            if is_dir && depth < max_depth {
                queue.push_back((path, depth + 1));
            }
        }
    }

    Ok((entries, truncated))
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List directory entries with type and size. Pass recursive=true to walk subdirectories."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The directory to list, relative to the workspace root"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Walk subdirectories (depth-capped)"
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
        let recursive = arguments["recursive"].as_bool().unwrap_or(false);

        let resolved = self.workspace.resolve(path)?;
        if !resolved.exists() {
            return Err(ToolError::NotFound(path.into()));
        }
        if !resolved.is_dir() {
            return Err(ToolError::InvalidArguments(format!(
                "'{path}' is not a directory"
            )));
        }

        let walk_root = resolved.clone();
        let (entries, truncated) =
            tokio::task::spawn_blocking(move || collect_entries(&walk_root, recursive))
                .await
                .map_err(|e| ToolError::Io(e.to_string()))??;

        let mut lines: Vec<String> = entries
            .iter()
            .map(|e| {
                if e.is_dir {
                    format!("{:>10}  {}/", "-", e.rel_path)
                } else {
                    format!("{:>10}  {}", e.size, e.rel_path)
                }
            })
            .collect();
        if truncated {
            lines.push(format!("... (listing capped at {MAX_ENTRIES} entries)"));
        }

        let output = if lines.is_empty() {
            "(empty)".to_string()
        } else {
            lines.join("\n")
        };

        let data: Vec<serde_json::Value> = entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "path": e.rel_path,
                    "kind": if e.is_dir { "dir" } else { "file" },
                    "size": e.size,
                })
            })
            .collect();

        Ok(ToolResult::ok_with_data(
            "",
            output,
            serde_json::json!({ "entries": data, "truncated": truncated }),
        ))
    }
}
