//! The orchestrator loop — the heart of quill.
//!
//! One turn of the cycle:
//!
//! 1. **Send** the session transcript (plus tool definitions) to the backend
//! 2. **Parse** the model turn into validated tool calls
//! 3. **If tool calls**: execute them in emission order, append every
//!    result, loop back to step 1
//! 4. **If text only**: the session is complete
//!
//! The loop runs until the model answers with text only, the turn cap is
//! reached, or the user interrupts. Every tool call appended to the
//! transcript gets exactly one result before the next backend call.

pub mod events;
pub mod loop_runner;
pub mod parser;
pub mod prompt;

pub use events::AgentStreamEvent;
pub use loop_runner::{AgentLoop, LoopOutcome};
pub use parser::{ParsedItem, ParsedTurn, parse_model_turn};
pub use prompt::default_system_prompt;
