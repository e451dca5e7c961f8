//! Config command - show or locate configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::DepotResult;

/// Execute the config command
pub fn execute(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> DepotResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => {
            let toml = toml::to_string_pretty(config)?;
            println!("{}", toml);
        }
        Some(ConfigAction::Path) => {
            println!("{}", manager.path().display());
        }
    }
    Ok(())
}
