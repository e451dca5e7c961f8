//! Init command - write a default configuration file

use console::style;

use crate::cli::args::InitArgs;
use crate::config::{Config, ConfigManager};
use crate::error::DepotResult;

/// Execute the init command
pub async fn execute(args: InitArgs, manager: &ConfigManager) -> DepotResult<()> {
    let path = manager.path();
    if path.exists() && !args.force {
        println!(
            "{} Config already exists at {} (use --force to overwrite)",
            style("!").yellow().bold(),
            path.display()
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    println!(
        "{} Configuration written to {}",
        style("✓").green().bold(),
        path.display()
    );
    Ok(())
}
