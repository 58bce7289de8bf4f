//! Configuration file support

use kite_agent::{AgentConfig, ConnectorLimits, HistoryConfig, LoopLimits};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors writing the config file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to write config: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for kite. Every key is optional; unset keys keep the
/// library defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model to use
    pub model: Option<String>,
    /// OpenAI-compatible endpoint
    pub base_url: Option<String>,
    /// API key (alternative to `KITE_API_KEY` / `OPENAI_API_KEY`)
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Stream responses (true by default)
    pub stream: Option<bool>,
    /// Hard timeout for each model call
    pub request_timeout_secs: Option<u64>,
    /// Hard timeout for each action
    pub action_timeout_secs: Option<u64>,
    /// Replaces the default personality line of the system prompt
    pub personality: Option<String>,
    /// Command used by the format action, `{path}` is substituted
    pub format_command: Option<String>,
    /// Command used by the typecheck action, `{path}` is substituted
    pub typecheck_command: Option<String>,
    pub history: HistorySection,
    pub limits: LimitsSection,
    pub connector: ConnectorSection,
}

/// `[history]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    pub max_messages: Option<usize>,
    pub keep_messages: Option<usize>,
}

/// `[limits]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    pub fail_fast_after: Option<u32>,
    pub duplicate_read_limit: Option<usize>,
    pub empty_response_retries: Option<u32>,
    pub max_corrections: Option<u32>,
    pub result_budget_chars: Option<usize>,
}

/// `[connector]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorSection {
    pub max_iterations: Option<u32>,
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kite")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("KITE_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a file. A missing file yields defaults; an
    /// unreadable or invalid one yields defaults with a warning.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Write the example config if no config file exists yet
    pub fn init() -> Result<PathBuf, ConfigError> {
        Self::init_at(&Self::config_path())
    }

    /// Write the example config to `path` unless a file is already there
    pub fn init_at(path: &Path) -> Result<PathBuf, ConfigError> {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, example_config())?;
        Ok(path.to_path_buf())
    }

    /// API key from config, then `KITE_API_KEY`, then `OPENAI_API_KEY`
    pub fn api_key(&self) -> kite_ai::Result<String> {
        kite_ai::providers::get_api_key(self.api_key.as_deref(), &["KITE_API_KEY", "OPENAI_API_KEY"])
    }

    /// Endpoint, falling back to the public OpenAI API
    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| kite_ai::providers::openai::DEFAULT_BASE_URL.to_string())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Agent settings with every configured key applied over the defaults
    pub fn agent_config(&self) -> AgentConfig {
        let defaults = AgentConfig::default();

        let history = HistoryConfig {
            max_messages: self
                .history
                .max_messages
                .unwrap_or(defaults.history.max_messages),
            keep_messages: self
                .history
                .keep_messages
                .unwrap_or(defaults.history.keep_messages),
        };

        let l = &self.limits;
        let d = defaults.limits;
        let limits = LoopLimits {
            fail_fast_after: l.fail_fast_after.unwrap_or(d.fail_fast_after),
            duplicate_read_limit: l.duplicate_read_limit.unwrap_or(d.duplicate_read_limit),
            empty_response_retries: l.empty_response_retries.unwrap_or(d.empty_response_retries),
            max_corrections: l.max_corrections.unwrap_or(d.max_corrections),
            result_budget_chars: l.result_budget_chars.unwrap_or(d.result_budget_chars),
        };

        AgentConfig {
            model: self.model.clone().unwrap_or(defaults.model),
            max_tokens: self.max_tokens.or(defaults.max_tokens),
            temperature: self.temperature.or(defaults.temperature),
            stream: self.stream.unwrap_or(defaults.stream),
            action_timeout: self
                .action_timeout_secs
                .map(Duration::from_secs)
                .or(defaults.action_timeout),
            history,
            limits,
            ..defaults
        }
    }

    /// Caps applied to connector-originated and delegated requests
    pub fn connector_limits(&self) -> ConnectorLimits {
        let defaults = ConnectorLimits::default();
        ConnectorLimits {
            max_iterations: self.connector.max_iterations.unwrap_or(defaults.max_iterations),
            timeout: self
                .connector
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# kite configuration file
# Place at ~/.config/kite/config.toml or point KITE_CONFIG_PATH at it

# Model to use
model = "gpt-4o"

# OpenAI-compatible endpoint
# base_url = "https://api.openai.com/v1"

# API key (optional - KITE_API_KEY or OPENAI_API_KEY work too)
# api_key = "sk-..."

# temperature = 0.2
# max_tokens = 4096

# Stream responses as they are generated
stream = true

# Hard timeouts in seconds
# request_timeout_secs = 600
action_timeout_secs = 300

# Replace the default personality line
# personality = "You are a careful senior engineer."

# Commands behind the format and typecheck actions
# format_command = "rustfmt {path}"
# typecheck_command = "cargo check"

# Sliding window: once history exceeds max_messages keep the newest keep_messages
[history]
max_messages = 40
keep_messages = 20

[limits]
fail_fast_after = 3
duplicate_read_limit = 3
empty_response_retries = 2
max_corrections = 3
result_budget_chars = 12000

# Caps used with --connector and for sub-agents
[connector]
max_iterations = 15
timeout_secs = 300
"#
}
