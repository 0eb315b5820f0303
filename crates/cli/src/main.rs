//! Concierge CLI
//!
//! Main entry point for the concierge command-line tool.
//! Sends questions through the search fan-out, classifies sensitive
//! queries and inspects the configured backends.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, BackendsCommand, ChatCommand, ClassifyCommand};
use concierge_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// Concierge - customer-support search fan-out with human handoff
#[derive(Parser, Debug)]
#[command(name = "concierge")]
#[command(about = "Customer-support search fan-out with human handoff", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "CONCIERGE_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "CONCIERGE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask one question
    Ask(AskCommand),

    /// Interactive conversation on one session
    Chat(ChatCommand),

    /// Classify a query without calling any backend
    Classify(ClassifyCommand),

    /// List configured search backends
    Backends(BackendsCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from environment and config file
    let config = AppConfig::load()?;

    // Apply CLI overrides, then re-read the file they may point to
    let config = config
        .with_overrides(
            cli.workspace,
            cli.config,
            cli.log_level,
            cli.verbose,
            cli.no_color,
        )
        .reload()?;

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("Concierge CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Backends configured: {}", config.backends.len());

    config.validate()?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Chat(_) => "chat",
        Commands::Classify(_) => "classify",
        Commands::Backends(_) => "backends",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    // Route to command handlers
    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Chat(cmd) => cmd.execute(&config).await,
        Commands::Classify(cmd) => cmd.execute(&config),
        Commands::Backends(cmd) => cmd.execute(&config),
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
