//! InsightEngine CLI: terminal interface for the deep-research agent.
//!
//! Researches a single topic from the command line, or starts an
//! interactive session when no topic is given.

mod commands;
mod repl;

use clap::Parser;
use insight_core::InsightConfig;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// InsightEngine: plan, search, read and write a cited research report
#[derive(Parser, Debug)]
#[command(name = "insight", version, about, long_about = None)]
struct Cli {
    /// Topic to research (starts interactive mode if omitted)
    topic: Option<String>,

    /// Stream the report while it is being written
    #[arg(long, overrides_with = "no_stream")]
    stream: bool,

    /// Print the report only once it is complete
    #[arg(long, overrides_with = "stream")]
    no_stream: bool,

    /// LLM model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Directory the report is saved to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Do not save the report to disk
    #[arg(long)]
    no_save: bool,

    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default configuration file into the workspace
    Init,
    /// Print the effective configuration
    Show,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    fn apply_overrides(&self, config: &mut InsightConfig) {
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if self.stream {
            config.llm.use_streaming = true;
        } else if self.no_stream {
            config.llm.use_streaming = false;
        }
        if let Some(dir) = &self.output_dir {
            config.output.directory = dir.clone();
        }
        if self.no_save {
            config.output.save_report = false;
        }
    }

    fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (API keys)
    let _ = dotenvy::dotenv();

    let mut cli = Cli::parse();

    // Human-readable layer for stderr
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(cli.log_filter()));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "insight", "insight")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "insight.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if let Some(command) = cli.command.take() {
        return commands::handle_command(command, &workspace, cli.config.as_deref()).await;
    }

    let mut config = insight_core::config::load_config(Some(&workspace), cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    cli.apply_overrides(&mut config);

    for warning in config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?
    {
        tracing::warn!("{}", warning);
    }

    let mut session = repl::ResearchSession::from_config(&config)?;
    match cli.topic {
        Some(topic) => session.research(&topic).await.map(|_| ()),
        None => repl::run_interactive(session, &config).await,
    }
}
