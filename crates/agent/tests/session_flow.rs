//! End-to-end orchestrator tests: a scripted backend driving the real
//! tool registry against a temporary workspace.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quill_agent::{AgentLoop, prompt};
use quill_core::abort::AbortSignal;
use quill_core::backend::{BackendRequest, ModeFlags, ModelBackend, ModelTurn};
use quill_core::error::BackendError;
use quill_core::event::EventBus;
use quill_core::session::{AbortReason, Session, SessionStatus};
use quill_core::todo::TodoHandle;
use quill_core::turn::{Role, Turn, TurnToolCall};
use quill_tools::{ShellSettings, default_registry};

/// Replays a scripted sequence of model turns.
struct ScriptedBackend {
    script: Mutex<Vec<ModelTurn>>,
    calls: Mutex<u32>,
}

impl ScriptedBackend {
    fn new(turns: Vec<ModelTurn>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(turns),
            calls: Mutex::new(0),
        })
    }

    fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, _request: BackendRequest) -> Result<ModelTurn, BackendError> {
        *self.calls.lock().unwrap() += 1;
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            return Err(BackendError::Api {
                status_code: 500,
                message: "script exhausted".into(),
            });
        }
        Ok(script.remove(0))
    }
}

fn text_turn(text: &str) -> ModelTurn {
    ModelTurn {
        text: text.into(),
        reasoning: None,
        tool_calls: vec![],
        usage: None,
        model: "scripted-model".into(),
    }
}

fn calls_turn(calls: Vec<(&str, serde_json::Value)>) -> ModelTurn {
    ModelTurn {
        text: String::new(),
        reasoning: None,
        tool_calls: calls
            .into_iter()
            .enumerate()
            .map(|(i, (name, args))| TurnToolCall {
                id: format!("call_{i}"),
                name: name.into(),
                arguments: args.to_string(),
            })
            .collect(),
        usage: None,
        model: "scripted-model".into(),
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    root: std::path::PathBuf,
    todos: TodoHandle,
    abort: AbortSignal,
    agent: AgentLoop,
    backend: Arc<ScriptedBackend>,
}

fn harness(script: Vec<ModelTurn>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let todos = quill_core::todo::new_handle();
    let abort = AbortSignal::new();
    let registry = default_registry(&root, todos.clone(), abort.clone(), ShellSettings::default());
    let backend = ScriptedBackend::new(script);
    let agent = AgentLoop::new(
        backend.clone(),
        Arc::new(registry),
        Arc::new(EventBus::default()),
        abort.clone(),
    );
    Harness {
        _dir: dir,
        root,
        todos,
        abort,
        agent,
        backend,
    }
}

fn session_with(flags: ModeFlags, todos: &TodoHandle, instruction: &str) -> Session {
    // The session and the registry share one TODO list
    let mut session =
        Session::new("scripted", "scripted-model", flags).with_todos(todos.clone());
    session.push(Turn::user(instruction));
    session
}

fn tool_turns(session: &Session) -> Vec<&Turn> {
    session
        .turns()
        .iter()
        .filter(|t| t.role == Role::Tool)
        .collect()
}

#[tokio::test]
async fn write_patch_read_cycle() {
    let h = harness(vec![
        calls_turn(vec![(
            "write_file",
            serde_json::json!({"path": "src/app.txt", "content": "version = 1\nname = demo\n"}),
        )]),
        calls_turn(vec![(
            "patch_file",
            serde_json::json!({"path": "src/app.txt", "find": "version = 1", "replace": "version = 2"}),
        )]),
        calls_turn(vec![(
            "read_file",
            serde_json::json!({"path": "src/app.txt"}),
        )]),
        text_turn("Bumped the version to 2."),
    ]);

    let mut session = session_with(ModeFlags::default(), &h.todos, "bump the version");
    let outcome = h.agent.run(&mut session).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.final_text.as_deref(), Some("Bumped the version to 2."));
    assert_eq!(outcome.tool_calls_made, 3);
    assert_eq!(h.backend.calls(), 4);

    let content = std::fs::read_to_string(h.root.join("src/app.txt")).unwrap();
    assert_eq!(content, "version = 2\nname = demo\n");

    // The read result the model saw carries the patched content
    let results = tool_turns(&session);
    assert_eq!(results.len(), 3);
    assert!(results[2].content.contains("version = 2"));
    assert!(session.dangling_call_ids().is_empty());
}

#[tokio::test]
async fn every_call_resolved_before_next_backend_invocation() {
    let h = harness(vec![
        calls_turn(vec![
            ("write_file", serde_json::json!({"path": "a.txt", "content": "a"})),
            ("read_file", serde_json::json!({"path": "missing.txt"})),
            ("bogus_tool", serde_json::json!({})),
        ]),
        text_turn("done"),
    ]);

    let mut session = session_with(ModeFlags::default(), &h.todos, "go");
    let outcome = h.agent.run(&mut session).await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Completed);

    let results = tool_turns(&session);
    assert_eq!(results.len(), 3);
    // Success, NotFound failure, UnknownTool failure, in emission order
    assert!(results[0].content.contains("Wrote 1 bytes"));
    assert!(results[1].content.contains("Not found"));
    assert!(results[2].content.contains("Unknown tool"));
    assert!(session.dangling_call_ids().is_empty());
}

#[tokio::test]
async fn text_format_tool_calls_work_without_native_support() {
    let h = harness(vec![
        text_turn(
            "Writing it now.\n```json\n{\"tool\": \"write_file\", \"path\": \"note.txt\", \"content\": \"hi\"}\n```",
        ),
        text_turn("Wrote the note."),
    ]);

    let mut session = session_with(ModeFlags::default(), &h.todos, "write a note");
    let outcome = h.agent.run(&mut session).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(std::fs::read_to_string(h.root.join("note.txt")).unwrap(), "hi");
}

#[tokio::test]
async fn planning_mode_injects_exactly_one_corrective_turn() {
    let h = harness(vec![
        // First turn ignores planning and goes straight to a shell call
        calls_turn(vec![("run_shell", serde_json::json!({"command": "echo skipped"}))]),
        // After the corrective turn the model plans properly
        calls_turn(vec![(
            "todo_update",
            serde_json::json!({"operation": "add", "descriptions": ["step one", "step two"]}),
        )]),
        text_turn("Planned and done."),
    ]);

    let mut session = session_with(
        ModeFlags {
            planning: true,
            ..Default::default()
        },
        &h.todos,
        "multi-step task",
    );
    let outcome = h.agent.run(&mut session).await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Completed);

    // Exactly one corrective system turn
    let corrections = session
        .turns()
        .iter()
        .filter(|t| t.role == Role::System && t.content == prompt::PLAN_REQUEST)
        .count();
    assert_eq!(corrections, 1);

    // The gated shell call was resolved, not executed
    let results = tool_turns(&session);
    assert!(results[0].content.contains("Planning mode requires"));

    // The plan landed in the shared TODO list
    assert_eq!(h.todos.lock().unwrap().len(), 2);
    assert!(session.dangling_call_ids().is_empty());
}

#[tokio::test]
async fn planning_mode_satisfied_by_initial_plan() {
    let h = harness(vec![
        calls_turn(vec![(
            "todo_update",
            serde_json::json!({"operation": "add", "description": "only step"}),
        )]),
        text_turn("done"),
    ]);

    let mut session = session_with(
        ModeFlags {
            planning: true,
            ..Default::default()
        },
        &h.todos,
        "task",
    );
    h.agent.run(&mut session).await.unwrap();

    assert!(
        !session
            .turns()
            .iter()
            .any(|t| t.content == prompt::PLAN_REQUEST)
    );
    assert_eq!(h.todos.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn cancel_mid_batch_resolves_every_call() {
    let h = harness(vec![
        calls_turn(vec![
            ("run_shell", serde_json::json!({"command": "echo first"})),
            ("run_shell", serde_json::json!({"command": "sleep 30"})),
            ("run_shell", serde_json::json!({"command": "echo third"})),
        ]),
        text_turn("never reached"),
    ]);

    let abort = h.abort.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        abort.trigger();
    });

    let mut session = session_with(ModeFlags::default(), &h.todos, "run things");
    let start = std::time::Instant::now();
    let outcome = h.agent.run(&mut session).await.unwrap();

    assert_eq!(
        outcome.status,
        SessionStatus::Aborted(AbortReason::UserCancelled)
    );
    // The sleeping child was killed, not waited out
    assert!(start.elapsed() < Duration::from_secs(10));
    // No further backend calls after the abort
    assert_eq!(h.backend.calls(), 1);

    let results = tool_turns(&session);
    assert_eq!(results.len(), 3);
    // Completed call keeps its real result; the interrupted call and the
    // never-started call both record a cancelled result
    assert!(results[0].content.contains("first"));
    assert!(results[1].content.contains("Cancelled"));
    assert!(results[2].content.contains("Cancelled"));
    assert!(session.dangling_call_ids().is_empty());
}

#[tokio::test]
async fn parallel_safe_reads_run_as_one_batch() {
    let h = harness(vec![
        calls_turn(vec![
            ("read_file", serde_json::json!({"path": "x.txt"})),
            ("read_file", serde_json::json!({"path": "y.txt"})),
        ]),
        text_turn("read both"),
    ]);
    std::fs::write(h.root.join("x.txt"), "xx").unwrap();
    std::fs::write(h.root.join("y.txt"), "yy").unwrap();

    let mut session = session_with(ModeFlags::default(), &h.todos, "read both files");
    let outcome = h.agent.run(&mut session).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Completed);
    let results = tool_turns(&session);
    assert_eq!(results.len(), 2);
    // Results appended in emission order regardless of concurrency
    assert_eq!(results[0].call_id.as_deref(), Some("call_0"));
    assert!(results[0].content.contains("xx"));
    assert!(results[1].content.contains("yy"));
}

#[tokio::test]
async fn streaming_mode_forwards_chunks_to_sink() {
    let dir = tempfile::tempdir().unwrap();
    let todos = quill_core::todo::new_handle();
    let abort = AbortSignal::new();
    let registry = default_registry(dir.path(), todos, abort.clone(), ShellSettings::default());
    let backend = ScriptedBackend::new(vec![text_turn("streamed answer")]);

    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let agent = AgentLoop::new(
        backend,
        Arc::new(registry),
        Arc::new(EventBus::default()),
        abort,
    )
    .with_streaming(true)
    .with_stream_sink(tx);

    let mut session = Session::new("scripted", "scripted-model", ModeFlags::default());
    session.push(Turn::user("hi"));
    let outcome = agent.run(&mut session).await.unwrap();
    assert_eq!(outcome.final_text.as_deref(), Some("streamed answer"));

    let mut saw_chunk = false;
    let mut saw_done = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            quill_agent::AgentStreamEvent::Chunk { content } => {
                assert_eq!(content, "streamed answer");
                saw_chunk = true;
            }
            quill_agent::AgentStreamEvent::Done { outcome, .. } => {
                assert_eq!(outcome, "completed");
                saw_done = true;
            }
            _ => {}
        }
    }
    assert!(saw_chunk && saw_done);
}
