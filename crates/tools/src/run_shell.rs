//! Shell tool — bounded command execution.
//!
//! Every command runs under a timeout and dies with it: the child is
//! spawned with `kill_on_drop`, so both the timeout path and a user abort
//! terminate the process instead of orphaning it. A non-zero exit is data
//! (exit code plus captured streams), never an error.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use quill_core::abort::AbortSignal;
use quill_core::error::ToolError;
use quill_core::tool::{Tool, ToolResult};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::workspace::Workspace;

const MAX_OUTPUT_CHARS: usize = 20_000;

pub struct RunShellTool {
    workspace: Workspace,
    abort: AbortSignal,
    allowlist: Vec<String>,
    default_timeout: Duration,
    max_timeout: Duration,
}

impl RunShellTool {
    pub fn new(workspace: Workspace, abort: AbortSignal) -> Self {
        Self {
            workspace,
            abort,
            allowlist: Vec::new(),
            default_timeout: Duration::from_secs(60),
            max_timeout: Duration::from_secs(120),
        }
    }

    /// Restrict execution to the given base commands. Empty = all allowed.
    pub fn with_allowlist(mut self, allowlist: Vec<String>) -> Self {
        self.allowlist = allowlist;
        self
    }

    pub fn with_timeouts(mut self, default_secs: u64, max_secs: u64) -> Self {
        self.default_timeout = Duration::from_secs(default_secs);
        self.max_timeout = Duration::from_secs(max_secs.max(default_secs));
        self
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        if self.allowlist.is_empty() {
            return true;
        }
        let base_cmd = command.split_whitespace().next().unwrap_or("").trim();
        self.allowlist.iter().any(|a| a == base_cmd)
    }
}

#[async_trait]
impl Tool for RunShellTool {
    fn name(&self) -> &str {
        "run_shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return exit code, stdout, and stderr. A non-zero exit is returned as data, not an error."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "working_dir": {
                    "type": "string",
                    "description": "Working directory, relative to the workspace root"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (capped by configuration)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let command = arguments["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        if !self.is_command_allowed(command) {
            return Err(ToolError::PermissionDenied(format!(
                "command '{}' not in allowlist",
                command.split_whitespace().next().unwrap_or("")
            )));
        }

        let working_dir = match arguments["working_dir"].as_str() {
            Some(dir) => self.workspace.resolve(dir)?,
            None => self.workspace.root().to_path_buf(),
        };

        let timeout = arguments["timeout"]
            .as_u64()
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout)
            .min(self.max_timeout);
        let timeout_secs = timeout.as_secs();

        debug!(command = %command, dir = %working_dir.display(), timeout_secs, "Executing shell command");

        let child = Command::new("sh")
            .args(["-c", command])
            .current_dir(&working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Io(format!("failed to spawn: {e}")))?;

        // Dropping the in-flight future (timeout or abort) kills the child.
        let output = tokio::select! {
            res = tokio::time::timeout(timeout, child.wait_with_output()) => match res {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => return Err(ToolError::Io(e.to_string())),
                Err(_) => {
                    warn!(command = %command, timeout_secs, "Command timed out, killed");
                    return Err(ToolError::Timeout { timeout_secs });
                }
            },
            _ = self.abort.cancelled() => {
                warn!(command = %command, "Command cancelled, killed");
                return Err(ToolError::Cancelled);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);
        let success = output.status.success();

        let mut result_text = if success {
            if stderr.is_empty() {
                stdout.clone()
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            }
        } else {
            format!("[exit code: {exit_code}]\n{stdout}\n{stderr}")
        };
        result_text = result_text.trim().to_string();
        if result_text.len() > MAX_OUTPUT_CHARS {
            result_text.truncate(MAX_OUTPUT_CHARS);
            result_text.push_str("\n... (truncated)");
        }
        if result_text.is_empty() {
            result_text = "(no output)".into();
        }

        Ok(ToolResult {
            call_id: String::new(),
            success,
            output: result_text,
            error: None,
            data: Some(serde_json::json!({
                "exit_code": exit_code,
                "stdout": stdout,
                "stderr": stderr,
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn tool_in(dir: &tempfile::TempDir) -> RunShellTool {
        RunShellTool::new(Workspace::new(dir.path()), AbortSignal::new())
    }

    #[test]
    fn allowlist_check() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(&dir).with_allowlist(vec!["ls".into(), "cat".into(), "git".into()]);
        assert!(tool.is_command_allowed("ls -la"));
        assert!(tool.is_command_allowed("git status"));
        assert!(!tool.is_command_allowed("rm -rf /"));
    }

    #[test]
    fn empty_allowlist_allows_all() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(&dir);
        assert!(tool.is_command_allowed("anything goes"));
    }

    #[tokio::test]
    async fn execute_echo() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(&dir);
        let result = tool
            .execute(serde_json::json!({"command": "echo hello"}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("hello"));
        assert_eq!(result.data.as_ref().unwrap()["exit_code"], 0);
    }

    #[tokio::test]
    async fn nonzero_exit_is_data_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(&dir);
        let result = tool
            .execute(serde_json::json!({"command": "echo oops >&2; exit 3"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.data.as_ref().unwrap()["exit_code"], 3);
        assert!(result.output.contains("exit code: 3"));
        assert!(result.output.contains("oops"));
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(&dir);

        let start = Instant::now();
        let err = tool
            .execute(serde_json::json!({"command": "sleep 30", "timeout": 1}))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Timeout { timeout_secs: 1 });
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn requested_timeout_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(&dir).with_timeouts(1, 1);

        let err = tool
            .execute(serde_json::json!({"command": "sleep 30", "timeout": 600}))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Timeout { timeout_secs: 1 });
    }

    #[tokio::test]
    async fn abort_cancels_in_flight_command() {
        let dir = tempfile::tempdir().unwrap();
        let abort = AbortSignal::new();
        let tool = RunShellTool::new(Workspace::new(dir.path()), abort.clone());

        let handle = tokio::spawn(async move {
            tool.execute(serde_json::json!({"command": "sleep 30"}))
                .await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        let start = Instant::now();
        abort.trigger();

        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err, ToolError::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn working_dir_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let tool = tool_in(&dir);

        let result = tool
            .execute(serde_json::json!({"command": "pwd", "working_dir": "sub"}))
            .await
            .unwrap();
        assert!(result.output.trim_end().ends_with("sub"));
    }

    #[tokio::test]
    async fn blocked_command() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(&dir).with_allowlist(vec!["ls".into()]);
        let err = tool
            .execute(serde_json::json!({"command": "rm -rf /"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied(_)));
    }
}
