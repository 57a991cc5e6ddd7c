//! System prompt assembly.
//!
//! The prompt is generated from the registry so the advertised tool list
//! always matches what is actually registered. Backends with native
//! function calling also receive the structured definitions; the JSON
//! block format below is the fallback contract for backends without it.

use quill_core::tool::ToolRegistry;

/// Build the default system prompt for a session.
pub fn default_system_prompt(registry: &ToolRegistry) -> String {
    let mut prompt = String::from(
        "You are quill, an autonomous terminal agent. You complete tasks by \
         calling tools against the user's workspace and reasoning over the \
         results.\n\nTOOLS AVAILABLE:\n",
    );

    for def in registry.definitions() {
        let required = def.required_params();
        prompt.push_str(&format!("\n- {}: {}", def.name, def.description));
        if !required.is_empty() {
            prompt.push_str(&format!(" (required: {})", required.join(", ")));
        }
    }

    prompt.push_str(
        "\n\nTOOL FORMAT - output JSON in a code block:\n\
         ```json\n{\"tool\": \"tool_name\", \"arg\": \"value\"}\n```\n\n\
         RULES:\n\
         - Chain tools as needed; after tool results, continue or respond.\n\
         - For multi-step tasks, plan first with todo_update, then mark items \
         in_progress and done as you work.\n\
         - For large files, use search_file to locate the relevant code, then \
         read_file with a line range.\n\
         - Use patch_file for small edits, write_file for new files or full \
         rewrites.\n\
         - A failed tool result tells you what went wrong; adjust and retry.\n\
         - When the task is finished, answer in plain text with no tool calls.",
    );

    prompt
}

/// Appended to the request (never the transcript) in verbose mode.
pub const VERBOSE_NUDGE: &str =
    "Think carefully and take your time. Verify your work before responding.";

/// Injected once when planning mode is active and the first tool-bearing
/// turn carries no plan.
pub const PLAN_REQUEST: &str = "Planning mode is active: before any other tool call, create an \
     initial task list with todo_update (operation \"add\") covering the steps \
     you intend to take. Then proceed, updating the list as you go.";

/// Injected when a turn carries neither text nor tool calls.
pub const EMPTY_TURN_NUDGE: &str =
    "Your last turn was empty. Respond with a final answer, or call a tool.";

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quill_core::error::ToolError;
    use quill_core::tool::{Tool, ToolResult};

    struct StubTool;

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            "read_file"
        }
        fn description(&self) -> &str {
            "Read the contents of a file."
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"]
            })
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
        ) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::ok("", ""))
        }
    }

    #[test]
    fn prompt_lists_registered_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(StubTool));

        let prompt = default_system_prompt(&registry);
        assert!(prompt.contains("read_file: Read the contents of a file."));
        assert!(prompt.contains("(required: path)"));
        assert!(prompt.contains("```json"));
    }
}
