//! quill CLI — the main entry point.
//!
//! Commands:
//! - `chat`   — Interactive session or single-message mode
//! - `status` — Show current configuration
//! - `doctor` — Check backend reachability

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "quill",
    about = "quill — an autonomous terminal agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Talk to the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Override the configured backend ("remote" or "local")
        #[arg(short, long)]
        backend: Option<String>,
    },

    /// Show current configuration
    Status,

    /// Check backend reachability
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Chat { message, backend } => commands::chat::run(message, backend).await?,
        Commands::Status => commands::status::run()?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
