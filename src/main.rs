//! depot - Self-hosted Maven artifact repository
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use depot::cli::{Cli, Commands};
use depot::config::ConfigManager;
use depot::error::DepotResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> DepotResult<()> {
    let cli = Cli::parse();

    // Initialize logging before anything that may log: 0 = warn, 1 = info,
    // 2+ = debug; DEPOT_LOG_FORMAT=json switches to structured output
    let filter = match cli.verbose {
        0 => EnvFilter::new("depot=warn,tower_http=warn"),
        1 => EnvFilter::new("depot=info,tower_http=info"),
        _ => EnvFilter::new("depot=debug,tower_http=debug"),
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if std::env::var("DEPOT_LOG_FORMAT").is_ok_and(|format| format == "json") {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    match cli.command {
        Commands::Serve => depot::cli::commands::serve(config).await,
        Commands::Init(args) => depot::cli::commands::init(args, &config_manager).await,
        Commands::Config(args) => depot::cli::commands::config(args, &config, &config_manager),
    }
}
