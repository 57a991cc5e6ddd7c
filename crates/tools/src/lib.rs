//! Built-in tool implementations for quill.
//!
//! Tools give the agent the ability to act on the machine: read, write,
//! and patch files, run shell commands, list directories, search inside
//! files, and manage the session TODO list.
//!
//! All file and shell operations are scoped to a configured workspace
//! root; paths that escape it are rejected.

pub mod list_dir;
pub mod patch_file;
pub mod read_file;
pub mod run_shell;
pub mod search_file;
pub mod todo_update;
pub mod workspace;
pub mod write_file;

use std::path::PathBuf;

use quill_core::abort::AbortSignal;
use quill_core::todo::TodoHandle;
use quill_core::tool::ToolRegistry;

pub use list_dir::ListDirTool;
pub use patch_file::PatchFileTool;
pub use read_file::ReadFileTool;
pub use run_shell::RunShellTool;
pub use search_file::SearchFileTool;
pub use todo_update::TodoUpdateTool;
pub use workspace::Workspace;
pub use write_file::WriteFileTool;

/// Settings for the shell tool, supplied by the config collaborator.
#[derive(Debug, Clone)]
pub struct ShellSettings {
    /// If non-empty, only these base commands are allowed.
    pub allowlist: Vec<String>,
    /// Timeout applied when the model does not pass one.
    pub default_timeout_secs: u64,
    /// Hard cap on any requested timeout.
    pub max_timeout_secs: u64,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            allowlist: Vec::new(),
            default_timeout_secs: 60,
            max_timeout_secs: 120,
        }
    }
}

/// Create the default tool registry, scoped to `root`.
///
/// `todos` is the session's TODO handle; `abort` is the session's abort
/// signal, wired into shell execution so an interrupt kills in-flight
/// children.
pub fn default_registry(
    root: impl Into<PathBuf>,
    todos: TodoHandle,
    abort: AbortSignal,
    shell: ShellSettings,
) -> ToolRegistry {
    let workspace = Workspace::new(root);
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ReadFileTool::new(workspace.clone())));
    registry.register(Box::new(WriteFileTool::new(workspace.clone())));
    registry.register(Box::new(PatchFileTool::new(workspace.clone())));
    registry.register(Box::new(
        RunShellTool::new(workspace.clone(), abort)
            .with_allowlist(shell.allowlist)
            .with_timeouts(shell.default_timeout_secs, shell.max_timeout_secs),
    ));
    registry.register(Box::new(ListDirTool::new(workspace.clone())));
    registry.register(Box::new(SearchFileTool::new(workspace)));
    registry.register(Box::new(TodoUpdateTool::new(todos)));
    registry
}
