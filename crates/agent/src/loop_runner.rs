//! The orchestrator state machine.
//!
//! `Idle → AwaitingModel → ProcessingToolCalls → AwaitingModel → ... →
//! Completed | Aborted`. Tool batches run sequentially in emission order
//! (concurrently only when every call is parallel-safe), the turn cap
//! bounds runaway tool cycles, and cancellation is cooperative: checked
//! between tool executions and while awaiting the backend, with in-flight
//! shell children killed. A cancelled batch still resolves every call, so
//! the transcript never carries a dangling tool call.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use quill_core::abort::AbortSignal;
use quill_core::backend::{BackendRequest, ModelBackend, ModelTurn, Usage};
use quill_core::error::{Error, ToolError};
use quill_core::event::{DomainEvent, EventBus};
use quill_core::session::{AbortReason, Session, SessionStatus};
use quill_core::tool::{ToolCall, ToolDefinition, ToolRegistry, ToolResult};
use quill_core::turn::Turn;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::events::AgentStreamEvent;
use crate::parser::{self, ParsedItem, ParsedTurn};
use crate::prompt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Idle,
    AwaitingModel,
    ProcessingToolCalls,
}

/// The terminal report of one orchestrator run.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub status: SessionStatus,
    pub final_text: Option<String>,
    pub turns_used: u32,
    pub tool_calls_made: usize,
}

/// The orchestrator driving a session to completion.
pub struct AgentLoop {
    backend: Arc<dyn ModelBackend>,
    tools: Arc<ToolRegistry>,
    event_bus: Arc<EventBus>,
    abort: AbortSignal,
    temperature: f32,
    max_tokens: Option<u32>,
    max_turns: u32,
    context_turns: usize,
    system_prompt: Option<String>,
    streaming: bool,
    sink: Option<mpsc::Sender<AgentStreamEvent>>,
}

impl AgentLoop {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
        abort: AbortSignal,
    ) -> Self {
        Self {
            backend,
            tools,
            event_bus,
            abort,
            temperature: 0.7,
            max_tokens: None,
            max_turns: 15,
            context_turns: 40,
            system_prompt: None,
            streaming: false,
            sink: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the turn cap.
    pub fn with_max_turns(mut self, max: u32) -> Self {
        self.max_turns = max.max(1);
        self
    }

    pub fn with_context_turns(mut self, turns: usize) -> Self {
        self.context_turns = turns;
        self
    }

    /// Override the generated system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Consume the backend as a fragment stream instead of complete turns.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Forward live events (chunks, tool calls, results) to a sink.
    pub fn with_stream_sink(mut self, sink: mpsc::Sender<AgentStreamEvent>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Drive the session until the model completes, the turn cap is hit,
    /// or the user cancels.
    ///
    /// Tool and parse failures are fed back to the model as data; only
    /// backend exhaustion (after retries) returns `Err`.
    pub async fn run(&self, session: &mut Session) -> Result<LoopOutcome, Error> {
        let prompt_text = self
            .system_prompt
            .clone()
            .unwrap_or_else(|| prompt::default_system_prompt(&self.tools));
        session.ensure_system(&prompt_text);

        info!(
            session_id = %session.id,
            turns = session.turns().len(),
            backend = self.backend.name(),
            "Session run started"
        );

        let tool_definitions = self.tools.definitions();
        let mut state = LoopState::Idle;
        debug!(session_id = %session.id, state = ?state, "Entering loop");
        let mut turns_used = 0u32;
        let mut tool_calls_made = 0usize;
        let mut last_usage: Option<Usage> = None;

        // The corrective plan request fires at most once per session, and
        // only while the TODO list is still empty.
        let mut plan_gate_armed = session.flags.planning
            && session
                .todos()
                .lock()
                .expect("todo lock poisoned")
                .is_empty();
        let mut plan_prompted = false;

        loop {
            if self.abort.is_triggered() {
                return Ok(self.finish(
                    session,
                    SessionStatus::Aborted(AbortReason::UserCancelled),
                    None,
                    turns_used,
                    tool_calls_made,
                    last_usage,
                ));
            }

            if turns_used >= self.max_turns {
                warn!(
                    session_id = %session.id,
                    max_turns = self.max_turns,
                    "Turn cap reached"
                );
                return Ok(self.finish(
                    session,
                    SessionStatus::Aborted(AbortReason::BudgetExceeded {
                        max_turns: self.max_turns,
                    }),
                    None,
                    turns_used,
                    tool_calls_made,
                    last_usage,
                ));
            }

            turns_used += 1;
            state = LoopState::AwaitingModel;
            debug!(session_id = %session.id, turn = turns_used, state = ?state, "Awaiting model");

            let request = self.build_request(session, &tool_definitions);
            let model_turn = tokio::select! {
                result = self.invoke_backend(request) => result?,
                _ = self.abort.cancelled() => {
                    return Ok(self.finish(
                        session,
                        SessionStatus::Aborted(AbortReason::UserCancelled),
                        None,
                        turns_used,
                        tool_calls_made,
                        last_usage,
                    ));
                }
            };

            if let Some(usage) = &model_turn.usage {
                last_usage = Some(usage.clone());
                self.event_bus.publish(DomainEvent::TurnCompleted {
                    session_id: session.id.to_string(),
                    model: model_turn.model.clone(),
                    tokens_used: usage.total_tokens,
                    timestamp: Utc::now(),
                });
            }

            let parsed = parser::parse_model_turn(&model_turn, &self.tools);

            if !parsed.has_calls() {
                let final_text = parsed.text.trim().to_string();
                if final_text.is_empty() {
                    // Neither text nor calls; nudge and let the cap bound it
                    debug!(session_id = %session.id, "Empty model turn");
                    session.push(Turn::system(prompt::EMPTY_TURN_NUDGE));
                    continue;
                }
                session.push(Turn::assistant_with_calls(
                    final_text.clone(),
                    model_turn.reasoning.clone(),
                    vec![],
                ));
                return Ok(self.finish(
                    session,
                    SessionStatus::Completed,
                    Some(final_text),
                    turns_used,
                    tool_calls_made,
                    last_usage,
                ));
            }

            state = LoopState::ProcessingToolCalls;
            debug!(
                session_id = %session.id,
                calls = parsed.items.len(),
                state = ?state,
                "Processing tool calls"
            );

            session.push(Turn::assistant_with_calls(
                parsed.text.clone(),
                model_turn.reasoning.clone(),
                parsed.raw_calls.clone(),
            ));

            if plan_gate_armed {
                if parsed.first_call().is_some_and(is_plan_seed) {
                    plan_gate_armed = false;
                } else if !plan_prompted {
                    // Resolve every call, then inject exactly one corrective
                    // system turn requesting the plan.
                    for item in &parsed.items {
                        let result = match item {
                            ParsedItem::Call(call) => {
                                ToolResult::failure(&call.id, ToolError::PlanRequired)
                            }
                            ParsedItem::Invalid(result) => result.clone(),
                        };
                        session.push(tool_turn(&result));
                    }
                    session.push(Turn::system(prompt::PLAN_REQUEST));
                    self.event_bus.publish(DomainEvent::PlanRequested {
                        session_id: session.id.to_string(),
                        timestamp: Utc::now(),
                    });
                    info!(session_id = %session.id, "Injected plan request");
                    plan_prompted = true;
                    plan_gate_armed = false;
                    continue;
                }
            }

            let results = self.execute_batch(&parsed).await;
            tool_calls_made += parsed.calls().count();

            let batch_cancelled = results
                .iter()
                .any(|r| matches!(r.error, Some(ToolError::Cancelled)));

            // All results are appended together; the model never observes a
            // partially resolved batch.
            for result in &results {
                session.push(tool_turn(result));
            }
            debug_assert!(
                session.dangling_call_ids().is_empty(),
                "transcript has unresolved tool calls"
            );

            if batch_cancelled || self.abort.is_triggered() {
                return Ok(self.finish(
                    session,
                    SessionStatus::Aborted(AbortReason::UserCancelled),
                    None,
                    turns_used,
                    tool_calls_made,
                    last_usage,
                ));
            }
        }
    }

    fn build_request(
        &self,
        session: &Session,
        tool_definitions: &[ToolDefinition],
    ) -> BackendRequest {
        let mut turns = session.context_window(self.context_turns);
        if session.flags.verbose {
            // Transient nudge; never persisted to the transcript
            turns.push(Turn::system(prompt::VERBOSE_NUDGE));
        }
        BackendRequest {
            model: session.model.clone(),
            turns,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: tool_definitions.to_vec(),
            flags: session.flags,
        }
    }

    /// One backend invocation, streaming or not, yielding a complete turn.
    async fn invoke_backend(&self, request: BackendRequest) -> Result<ModelTurn, Error> {
        if !self.streaming {
            return Ok(self.backend.send(request).await?);
        }

        let model = request.model.clone();
        let mut rx = self.backend.stream(request).await.map_err(Error::Backend)?;

        let mut text = String::new();
        let mut reasoning = String::new();
        let mut tool_calls = Vec::new();
        let mut usage = None;

        while let Some(item) = rx.recv().await {
            let fragment = item.map_err(Error::Backend)?;
            if let Some(delta) = &fragment.text {
                text.push_str(delta);
                self.emit(AgentStreamEvent::Chunk {
                    content: delta.clone(),
                });
            }
            if let Some(delta) = &fragment.reasoning {
                reasoning.push_str(delta);
                self.emit(AgentStreamEvent::Reasoning {
                    content: delta.clone(),
                });
            }
            if fragment.done {
                tool_calls = fragment.tool_calls;
                usage = fragment.usage;
                break;
            }
        }

        Ok(ModelTurn {
            text,
            reasoning: (!reasoning.is_empty()).then_some(reasoning),
            tool_calls,
            usage,
            model,
        })
    }

    /// Execute one parsed batch. Sequential in emission order unless every
    /// call is parallel-safe; either way all results come back together.
    async fn execute_batch(&self, parsed: &ParsedTurn) -> Vec<ToolResult> {
        let call_count = parsed.calls().count();
        let all_parallel_safe = call_count > 1
            && parsed.calls().all(|call| self.tools.is_parallel_safe(&call.name));

        if all_parallel_safe && !self.abort.is_triggered() {
            let futures: Vec<_> = parsed
                .items
                .iter()
                .map(|item| async move {
                    match item {
                        ParsedItem::Call(call) => self.execute_one(call).await,
                        ParsedItem::Invalid(result) => result.clone(),
                    }
                })
                .collect();
            return join_all(futures).await;
        }

        let mut results = Vec::with_capacity(parsed.items.len());
        let mut cancelled = self.abort.is_triggered();
        for item in &parsed.items {
            match item {
                ParsedItem::Invalid(result) => results.push(result.clone()),
                ParsedItem::Call(call) => {
                    if cancelled {
                        // Un-started calls still get a terminal result
                        results.push(ToolResult::failure(&call.id, ToolError::Cancelled));
                        continue;
                    }
                    let result = self.execute_one(call).await;
                    if matches!(result.error, Some(ToolError::Cancelled))
                        || self.abort.is_triggered()
                    {
                        cancelled = true;
                    }
                    results.push(result);
                }
            }
        }
        results
    }

    async fn execute_one(&self, call: &ToolCall) -> ToolResult {
        self.emit(AgentStreamEvent::ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        });
        debug!(tool = %call.name, id = %call.id, "Executing tool call");

        let start = Instant::now();
        let mut result = match self.tools.execute(call).await {
            Ok(result) => result,
            Err(e) => ToolResult::failure(&call.id, e),
        };
        result.call_id = call.id.clone();
        let duration_ms = start.elapsed().as_millis() as u64;

        if !result.success {
            warn!(tool = %call.name, error = %result.output, "Tool call failed");
        }
        self.event_bus.publish(DomainEvent::ToolExecuted {
            tool_name: call.name.clone(),
            success: result.success,
            duration_ms,
            timestamp: Utc::now(),
        });
        self.emit(AgentStreamEvent::ToolResult {
            id: result.call_id.clone(),
            name: call.name.clone(),
            output: result.output.clone(),
            success: result.success,
        });

        result
    }

    fn finish(
        &self,
        session: &Session,
        status: SessionStatus,
        final_text: Option<String>,
        turns_used: u32,
        tool_calls_made: usize,
        usage: Option<Usage>,
    ) -> LoopOutcome {
        info!(
            session_id = %session.id,
            status = %status,
            turns = turns_used,
            tool_calls = tool_calls_made,
            "Session run finished"
        );
        self.event_bus.publish(DomainEvent::SessionEnded {
            session_id: session.id.to_string(),
            outcome: status.to_string(),
            timestamp: Utc::now(),
        });
        self.emit(AgentStreamEvent::Done {
            session_id: session.id.to_string(),
            outcome: status.to_string(),
            usage,
            turns: turns_used,
            tool_calls_made,
        });
        LoopOutcome {
            status,
            final_text,
            turns_used,
            tool_calls_made,
        }
    }

    fn emit(&self, event: AgentStreamEvent) {
        if let Some(sink) = &self.sink {
            // A slow or gone renderer never stalls the loop
            let _ = sink.try_send(event);
        }
    }
}

fn is_plan_seed(call: &ToolCall) -> bool {
    call.name == "todo_update" && call.arguments["operation"] == "add"
}

fn tool_turn(result: &ToolResult) -> Turn {
    let content = if result.success {
        result.output.clone()
    } else {
        format!("Error: {}", result.output)
    };
    Turn::tool_result(&result.call_id, content)
}
