//! SOLVE-IT MCP server
//!
//! Entry point: parses flags, sets up logging, loads the knowledge base and
//! serves MCP over stdio. `tools` and `policy` print static information and
//! exit without touching the data directory.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use solveit_core::{
    logging, CliOverrides, Dispatcher, JsonKnowledgeBase, McpServer, SecurityMiddleware,
    SecurityPolicy, ServerConfig, ToolRegistry,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "solveit-mcp")]
#[command(about = "MCP server for the SOLVE-IT digital forensics knowledge base", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// SOLVE-IT checkout or its data/ directory (overrides SOLVE_IT_DATA_PATH)
    #[arg(long, global = true)]
    data_path: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error (overrides LOG_LEVEL)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Objective mapping file loaded at startup
    #[arg(long, global = true)]
    mapping: Option<String>,

    /// Transport to serve on
    #[arg(long, value_enum, default_value_t = Transport::Stdio)]
    transport: Transport,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP requests (default)
    Serve,

    /// Print the tool catalogue as JSON
    Tools,

    /// Print the effective security policy as JSON
    Policy,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Transport {
    Stdio,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let overrides = CliOverrides {
        data_path: cli.data_path,
        log_level: cli.log_level,
        mapping_file: cli.mapping,
    };

    let log_config =
        ServerConfig::log_config(&overrides).context("Invalid logging configuration")?;
    logging::init(&log_config)?;

    debug!("solveit-mcp v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&overrides, cli.transport).await,
        Commands::Tools => {
            let policy = SecurityPolicy::load().context("Invalid security policy")?;
            let registry = ToolRegistry::solveit(&policy)?;
            println!("{}", serde_json::to_string_pretty(&registry.list())?);
            Ok(())
        }
        Commands::Policy => {
            let policy = SecurityPolicy::load().context("Invalid security policy")?;
            println!("{}", serde_json::to_string_pretty(&policy)?);
            Ok(())
        }
    }
}

async fn serve(overrides: &CliOverrides, transport: Transport) -> anyhow::Result<()> {
    debug!(?transport, "Starting MCP server...");

    let config = ServerConfig::load(overrides).context("Failed to load server configuration")?;

    // Profiles are checked before any data is read
    let registry =
        ToolRegistry::solveit(&config.policy).context("Tool registration failed")?;

    let data_path = config.data_path.clone();
    let mapping_file = config.mapping_file.clone();
    let knowledge_base =
        tokio::task::spawn_blocking(move || JsonKnowledgeBase::load(&data_path, &mapping_file))
            .await
            .context("Knowledge base loader panicked")?
            .with_context(|| {
                format!(
                    "Failed to load SOLVE-IT knowledge base from {}",
                    config.data_path.display()
                )
            })?;

    let dispatcher = Dispatcher::new(
        registry,
        SecurityMiddleware::new(config.policy),
        Arc::new(knowledge_base),
    );
    let server = McpServer::new(Arc::new(dispatcher));

    // Run server with graceful shutdown on signals
    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, stopping MCP server gracefully...");
        }
    }

    Ok(())
}
