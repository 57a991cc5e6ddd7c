//! `quill chat` — interactive session or single-message mode.
//!
//! The CLI is glue: it loads config, wires the backend router, the tool
//! registry, and the abort signal together, and renders outcomes. All
//! agent behavior lives in the library crates.

use std::io::Write as _;
use std::sync::Arc;

use quill_agent::AgentLoop;
use quill_backends::router::{self, BackendRouter};
use quill_config::AppConfig;
use quill_core::abort::AbortSignal;
use quill_core::backend::ModeFlags;
use quill_core::event::EventBus;
use quill_core::session::{AbortReason, Session, SessionStatus};
use quill_core::tool::ToolRegistry;
use quill_core::turn::Turn;
use quill_tools::{ShellSettings, default_registry};
use tokio::io::AsyncBufReadExt;

pub async fn run(
    message: Option<String>,
    backend_override: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load()?;
    if let Some(backend) = backend_override {
        config.backend = backend;
        config.validate()?;
    }

    if config.backend == "remote" && config.remote.api_key.is_none() {
        eprintln!();
        eprintln!("  ERROR: No API key configured for the remote backend!");
        eprintln!();
        eprintln!("  Set the environment variable:");
        eprintln!("    export QUILL_API_KEY='sk-...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!(
            "    {}",
            AppConfig::config_dir().join("config.toml").display()
        );
        eprintln!();
        eprintln!("  Or run against a local inference service instead:");
        eprintln!("    quill chat --backend local");
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let router = router::build_from_config(&config);
    let workspace_root = config.resolve_workspace_root();

    let abort = AbortSignal::new();
    let todos = quill_core::todo::new_handle();
    let registry = Arc::new(default_registry(
        &workspace_root,
        todos.clone(),
        abort.clone(),
        ShellSettings {
            allowlist: config.shell.allowlist.clone(),
            default_timeout_secs: config.shell.timeout_secs,
            max_timeout_secs: config.shell.max_timeout_secs,
        },
    ));
    let event_bus = Arc::new(EventBus::default());

    let flags = ModeFlags {
        reasoning: config.modes.reasoning,
        planning: config.modes.planning,
        verbose: config.modes.verbose,
    };
    let mut session =
        Session::new(&config.backend, config.active_model(), flags).with_todos(todos);

    if let Some(msg) = message {
        // Single message mode
        session.push(Turn::user(&msg));
        let outcome =
            run_turn(&config, &router, &registry, &event_bus, &abort, &mut session).await?;
        match outcome {
            Some(text) => println!("{text}"),
            None => std::process::exit(1),
        }
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  quill — autonomous terminal agent");
    println!();
    println!("  Backend:    {}", session.backend);
    println!("  Model:      {}", session.model);
    println!("  Workspace:  {}", workspace_root.display());
    println!("  Type /help for commands, /exit to quit.");
    println!();

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim().to_string();
        if input.is_empty() {
            continue;
        }

        match input.as_str() {
            "/exit" | "exit" => break,
            "/help" => {
                println!("  /status  show session state");
                println!("  /local   switch to the local backend");
                println!("  /remote  switch to the remote backend");
                println!("  /reset   clear the conversation and task list");
                println!("  /exit    quit");
                continue;
            }
            "/status" => {
                println!("  Backend:  {}", session.backend);
                println!("  Model:    {}", session.model);
                println!("  Turns:    {}", session.turns().len());
                println!("  Tasks:\n{}", indent(&render_todos(&session)));
                continue;
            }
            "/reset" => {
                session.reset();
                println!("  Session reset.");
                continue;
            }
            "/local" => {
                session.backend = "local".into();
                session.model = config.local.model.clone();
                println!("  Switched to local ({}).", session.model);
                continue;
            }
            "/remote" | "/cloud" => {
                if router.get("remote").is_none() {
                    println!("  Remote backend is not configured (no API key).");
                } else {
                    session.backend = "remote".into();
                    session.model = config.model.clone();
                    println!("  Switched to remote ({}).", session.model);
                }
                continue;
            }
            _ => {}
        }

        session.push(Turn::user(&input));
        match run_turn(&config, &router, &registry, &event_bus, &abort, &mut session).await {
            Ok(Some(text)) => {
                println!();
                for line in text.lines() {
                    println!("  {line}");
                }
                println!();
            }
            Ok(None) => println!(),
            Err(e) => {
                eprintln!("  [error] {e}");
                println!();
            }
        }
    }

    println!("  Goodbye!");
    Ok(())
}

/// Drive one user instruction to a terminal state. Ctrl-C cancels the
/// in-flight run instead of killing the process.
async fn run_turn(
    config: &AppConfig,
    router: &BackendRouter,
    registry: &Arc<ToolRegistry>,
    event_bus: &Arc<EventBus>,
    abort: &AbortSignal,
    session: &mut Session,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let backend = router
        .get(&session.backend)
        .ok_or_else(|| format!("backend '{}' is not configured", session.backend))?;

    let agent = AgentLoop::new(backend, registry.clone(), event_bus.clone(), abort.clone())
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens)
        .with_max_turns(config.max_turns)
        .with_context_turns(config.context_turns);

    abort.reset();
    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
    let signal_abort = abort.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => signal_abort.trigger(),
            _ = done_rx => {}
        }
    });

    let result = agent.run(session).await;
    let _ = done_tx.send(());
    abort.reset();

    let outcome = result?;
    match outcome.status {
        SessionStatus::Completed => Ok(outcome.final_text),
        SessionStatus::Aborted(AbortReason::UserCancelled) => {
            eprintln!("  [cancelled]");
            Ok(None)
        }
        SessionStatus::Aborted(AbortReason::BudgetExceeded { max_turns }) => {
            eprintln!("  [stopped: turn cap of {max_turns} reached]");
            Ok(None)
        }
    }
}

fn render_todos(session: &Session) -> String {
    let items = session.todo_snapshot();
    if items.is_empty() {
        return "(no tasks)".into();
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {:?} {}", i + 1, item.status, item.description))
        .collect::<Vec<_>>()
        .join("\n")
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|l| format!("    {l}"))
        .collect::<Vec<_>>()
        .join("\n")
}
