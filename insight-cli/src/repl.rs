//! Single-topic and interactive research modes.

use futures::StreamExt;
use insight_core::config::OutputConfig;
use insight_core::research::{ResearchReport, RunState, StageKind};
use insight_core::{InsightConfig, PipelineBuilder, ResearchCallback, ResearchPipeline};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

const STARTING_LABEL: &str = "🚀 Agent starting...";
const COMPLETE_LABEL: &str = "✅ Research Complete!";

/// Prints stage progress to stdout.
pub(crate) struct ConsoleCallback;

impl ResearchCallback for ConsoleCallback {
    fn on_stage_start(&self, stage: StageKind) {
        tracing::debug!(stage = %stage, "Stage started");
        println!("  \x1b[90m… {}\x1b[0m", stage.label());
    }

    fn on_stage_complete(&self, _stage: StageKind, messages: &[String]) {
        for message in messages {
            println!("  \x1b[36m•\x1b[0m {}", message);
        }
    }

    fn on_run_complete(&self, _state: &RunState) {
        println!("\x1b[1;32m{}\x1b[0m\n", COMPLETE_LABEL);
    }
}

/// Who said a line of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HistoryEntry {
    pub speaker: Speaker,
    pub content: String,
}

/// A pipeline plus the presentation settings and chat history of one session.
pub(crate) struct ResearchSession {
    pipeline: ResearchPipeline,
    output: OutputConfig,
    streaming: bool,
    history: Vec<HistoryEntry>,
}

impl ResearchSession {
    pub fn new(pipeline: ResearchPipeline, output: OutputConfig, streaming: bool) -> Self {
        Self {
            pipeline,
            output,
            streaming,
            history: Vec::new(),
        }
    }

    /// Wire the configured LLM provider and the web collaborators together.
    pub fn from_config(config: &InsightConfig) -> anyhow::Result<Self> {
        let llm = insight_core::create_provider(&config.llm)
            .map_err(|e| anyhow::anyhow!("LLM provider init failed: {}", e))?;
        let web = insight_tools::web_collaborators(&config.research)?;
        let pipeline = PipelineBuilder::new(llm, web.search, web.fetcher, web.extractor)
            .config(config.research.clone())
            .completion_options(config.llm.completion_options())
            .build();
        Ok(Self::new(
            pipeline,
            config.output.clone(),
            config.llm.use_streaming,
        ))
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Research one topic: print progress and the report, then save it.
    pub async fn research(&mut self, topic: &str) -> anyhow::Result<ResearchReport> {
        println!("\n\x1b[1m{}\x1b[0m", STARTING_LABEL);
        let callback = ConsoleCallback;

        let report = if self.streaming {
            let state = self.pipeline.gather(topic, &callback).await?;
            let mut chunks = self.pipeline.synthesizer().stream(&state);
            let mut markdown = String::new();
            println!();
            while let Some(chunk) = chunks.next().await {
                print!("{}", chunk);
                let _ = io::stdout().flush();
                markdown.push_str(&chunk);
            }
            println!("\n\n\x1b[1;32m{}\x1b[0m", COMPLETE_LABEL);
            ResearchReport::new(&state, markdown)
        } else {
            let state = self.pipeline.run(topic, &callback).await?;
            let report = ResearchReport::from_state(&state)
                .ok_or_else(|| anyhow::anyhow!("Research run produced no answer"))?;
            println!("{}", report.markdown);
            report
        };

        self.history.push(HistoryEntry {
            speaker: Speaker::User,
            content: topic.trim().to_string(),
        });
        self.history.push(HistoryEntry {
            speaker: Speaker::Assistant,
            content: report.markdown.clone(),
        });

        if let Some(path) = self.save(&report) {
            println!("\n📥 Report saved to {}", path.display());
        }
        Ok(report)
    }

    /// Save the report if saving is enabled. Failures are logged, not fatal.
    fn save(&self, report: &ResearchReport) -> Option<PathBuf> {
        if !self.output.save_report {
            return None;
        }
        match report.save(&self.output.directory, &self.output.report_filename) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to save report");
                eprintln!("Could not save report: {}", e);
                None
            }
        }
    }
}

/// Interactive loop: each line is a research topic, `/`-prefixed lines are commands.
pub async fn run_interactive(
    mut session: ResearchSession,
    config: &InsightConfig,
) -> anyhow::Result<()> {
    println!("\x1b[1;32m🕵️  InsightEngine: Deep Research Agent\x1b[0m");
    println!(
        "  Model: {} | Streaming: {} | Reports: {}",
        config.llm.model,
        if session.streaming { "on" } else { "off" },
        if session.output.save_report {
            session.output.directory.display().to_string()
        } else {
            "not saved".to_string()
        }
    );
    println!("  Type a topic to research, /help for commands, /quit to exit\n");

    let stdin = io::stdin();
    loop {
        print!("\x1b[1;34mWhat do you want to research? \x1b[0m");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input).is_err() || input.is_empty() {
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if input.starts_with('/') {
            match input.split_whitespace().next().unwrap_or("") {
                "/quit" | "/exit" | "/q" => {
                    println!("Goodbye!");
                    break;
                }
                "/help" | "/?" => println!("{}", help_text()),
                "/history" => print_history(session.history()),
                "/clear" => {
                    session.clear_history();
                    print!("\x1b[2J\x1b[H");
                }
                other => println!("Unknown command: {}. Type /help for commands.", other),
            }
            continue;
        }

        if let Err(e) = session.research(input).await {
            eprintln!("\x1b[31mAgent Error:\x1b[0m {}", e);
        }
    }

    Ok(())
}

fn help_text() -> &'static str {
    "Commands:\n  /history  Show the topics and reports of this session\n  /clear    Forget the session history and clear the screen\n  /help     Show this help\n  /quit     Exit"
}

fn print_history(history: &[HistoryEntry]) {
    if history.is_empty() {
        println!("No research yet.");
        return;
    }
    for entry in history {
        match entry.speaker {
            Speaker::User => println!("\x1b[1;34m> {}\x1b[0m", entry.content),
            Speaker::Assistant => println!("{}\n", entry.content),
        }
    }
}
