//! CLI subcommand handlers.

use crate::{Commands, ConfigAction};
use std::path::Path;

/// Dispatch a subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    explicit_config: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace, explicit_config),
    }
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    explicit_config: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = insight_core::config::workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            let path = insight_core::config::write_default_config(workspace)
                .map_err(|e| anyhow::anyhow!("Failed to write config: {}", e))?;
            println!("Created configuration file: {}", path.display());
            println!(
                "Set GEMINI_API_KEY (or the variable named by llm.api_key_env) to get started."
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = insight_core::config::load_config(Some(workspace), explicit_config)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
