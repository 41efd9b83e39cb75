//! Configuration system for InsightEngine.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> explicit config file -> environment.
//! Configuration is loaded from `~/.config/insight/config.toml` and/or
//! `.insight/config.toml` in the workspace directory.

use crate::error::ConfigError;
use crate::types::CompletionOptions;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Filename of the Markdown artifact offered for download.
pub const DEFAULT_REPORT_FILENAME: &str = "research_report.md";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    pub llm: LlmConfig,
    pub research: ResearchConfig,
    pub output: OutputConfig,
}

/// Configuration for the LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "gemini", "openai", or any OpenAI-compatible backend.
    pub provider: String,
    /// Model identifier (e.g., "gemini-2.5-flash", "gpt-4o-mini").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Inline API key; takes precedence over `api_key_env` when set.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Optional base URL override for the API endpoint.
    pub base_url: Option<String>,
    /// Maximum tokens to generate; provider default when unset.
    pub max_tokens: Option<usize>,
    /// Sampling temperature. Zero keeps runs reproducible.
    pub temperature: f32,
    /// Whole-request timeout for completion calls.
    pub timeout_secs: u64,
    /// Stream the report token-by-token instead of returning it at once.
    pub use_streaming: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: None,
            temperature: 0.0,
            timeout_secs: 120,
            use_streaming: false,
        }
    }
}

impl LlmConfig {
    /// Per-call options for the pipeline's model calls.
    ///
    /// The model is left unset so the provider's configured model is used.
    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            model: None,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Validate this LLM config and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.temperature < 0.0 || self.temperature > 2.0 {
            warnings.push(format!(
                "temperature ({}) is outside the typical range 0.0-2.0",
                self.temperature
            ));
        }
        if self.temperature > 0.0 {
            warnings.push(format!(
                "temperature ({}) is non-zero; runs will not be reproducible",
                self.temperature
            ));
        }
        if self.timeout_secs == 0 {
            warnings.push("llm.timeout_secs is 0; requests will fail immediately".to_string());
        }
        warnings
    }
}

/// Settings for the four pipeline stages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub planner: PlannerConfig,
    pub search: SearchConfig,
    pub scraper: ScraperConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Number of queries the planner prompt asks for.
    pub query_count: usize,
    /// Hard cap applied to whatever the model returns.
    pub max_queries: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            query_count: 3,
            max_queries: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Results requested per query.
    pub max_results_per_query: usize,
    /// Request timeout for the search provider.
    pub timeout_secs: u64,
    /// Optional region code passed to the provider (e.g. "us-en").
    pub region: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results_per_query: 2,
            timeout_secs: 10,
            region: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Pages whose extracted text is not longer than this are discarded.
    pub min_content_chars: usize,
    /// Per-page fetch timeout.
    pub timeout_secs: u64,
    /// Bodies larger than this are truncated before extraction.
    pub max_download_bytes: usize,
    pub user_agent: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            min_content_chars: 500,
            timeout_secs: 15,
            max_download_bytes: 2_000_000,
            user_agent: concat!("insight/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Ceiling on concurrent per-item calls inside the searcher and scraper.
    /// `1` runs every item sequentially.
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

/// Where and how the final report is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub report_filename: String,
    pub save_report: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            report_filename: DEFAULT_REPORT_FILENAME.to_string(),
            save_report: true,
        }
    }
}

impl InsightConfig {
    /// Check the whole configuration.
    ///
    /// Hard errors are returned as `Err`; soft problems come back as warnings.
    pub fn validate(&self) -> Result<Vec<String>, ConfigError> {
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "llm.model".to_string(),
            });
        }
        if self.research.planner.max_queries == 0 {
            return Err(ConfigError::Invalid {
                message: "research.planner.max_queries must be at least 1".to_string(),
            });
        }
        if self.research.search.max_results_per_query == 0 {
            return Err(ConfigError::Invalid {
                message: "research.search.max_results_per_query must be at least 1".to_string(),
            });
        }
        if self.research.pipeline.concurrency == 0 {
            return Err(ConfigError::Invalid {
                message: "research.pipeline.concurrency must be at least 1".to_string(),
            });
        }
        if self.output.report_filename.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "output.report_filename".to_string(),
            });
        }

        let mut warnings = self.llm.validate();
        let planner = &self.research.planner;
        if planner.query_count > planner.max_queries {
            warnings.push(format!(
                "planner.query_count ({}) exceeds planner.max_queries ({}); extra queries are dropped",
                planner.query_count, planner.max_queries
            ));
        }
        if self.research.scraper.min_content_chars == 0 {
            warnings.push("scraper.min_content_chars is 0; empty pages will be kept".to_string());
        }
        Ok(warnings)
    }
}

/// Path of the user-level config file, if the platform has a config dir.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "insight", "insight")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".insight").join("config.toml")
}

/// Load configuration with layered merging.
///
/// Priority (highest wins):
/// 1. Environment variables (`INSIGHT_LLM__MODEL`, `INSIGHT_RESEARCH__PIPELINE__CONCURRENCY`, ...)
/// 2. Explicit config file (`--config`)
/// 3. Workspace-local config (`.insight/config.toml`)
/// 4. User config (`~/.config/insight/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<InsightConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(InsightConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("INSIGHT_").split("__"));

    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}

/// Write a default config to the workspace, returning its path.
///
/// Existing files are left untouched.
pub fn write_default_config(workspace: &Path) -> Result<PathBuf, ConfigError> {
    let path = workspace_config_path(workspace);
    if path.exists() {
        return Ok(path);
    }
    let toml = toml::to_string_pretty(&InsightConfig::default()).map_err(|e| {
        ConfigError::ParseError {
            message: e.to_string(),
        }
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid {
            message: format!("cannot create {}: {e}", parent.display()),
        })?;
    }
    std::fs::write(&path, toml).map_err(|e| ConfigError::Invalid {
        message: format!("cannot write {}: {e}", path.display()),
    })?;
    Ok(path)
}
