//! Configuration management
//!
//! This module handles loading, validation, and management of the annotator
//! configuration. Configuration is stored in TOML format at
//! ~/.annotator/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **llm**: Inference endpoint, model, credentials source, request options
//! - **gateway**: Retry budget, backoff curve, timeout, request rate
//! - **scheduler**: Strategy selection, concurrency cap, shot mode
//! - **memory**: Context budget for long-lived sessions
//! - **sessions**: Overwrite policy and the optional debug index
//! - **prompts**: Optional prompt template override
//!
//! Everything here is consumed once at startup. CLI flags override individual
//! values before the scheduler is built.
//!
//! # Examples
//!
//! ```no_run
//! use annotator_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Data dir: {:?}", config.core.data_dir);
//! println!("Model: {}", config.llm.model);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use sdk::types::StrategyKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::prompts::ShotMode;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    pub core: CoreConfig,

    /// Inference endpoint configuration
    pub llm: LLMConfig,

    /// Retry and rate policy for inference calls
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Scheduler settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Long-lived session memory budget
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Session store settings
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Prompt template settings
    #[serde(default)]
    pub prompts: PromptsConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// OpenAI-compatible inference endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Base URL of the chat completions API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Inline API key (takes precedence over `api_key_env`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Maximum tokens per response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

/// Inference gateway policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Attempts per call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the first retry (milliseconds)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for a single backoff (milliseconds)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Per-call timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Optional request rate cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_minute: Option<u32>,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Strategies to run
    #[serde(default = "default_strategies")]
    pub strategies: Vec<StrategyKind>,

    /// Upper bound on concurrently running parallel-group tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency_cap: Option<usize>,

    /// Exemplar inclusion
    #[serde(default)]
    pub shot_mode: ShotMode,
}

/// Memory configuration for long-lived sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Context budget in estimated tokens
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Fraction of the budget at which a session counts as full (0.0-1.0)
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,
}

/// Session store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Replace existing transcripts instead of failing with a conflict
    #[serde(default)]
    pub overwrite: bool,

    /// Maintain the debug session index (shared file, single writer)
    #[serde(default)]
    pub index_enabled: bool,
}

/// Prompt template configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// TOML file overriding the built-in templates (supports ~ expansion)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_file: Option<PathBuf>,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.annotator")
}

fn default_base_url() -> String {
    "https://api.deepseek.com/v1".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_api_key_env() -> String {
    "DEEPSEEK_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    500
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    2_000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_strategies() -> Vec<StrategyKind> {
    vec![StrategyKind::Single]
}

fn default_max_context_tokens() -> usize {
    128_000
}

fn default_warning_threshold() -> f64 {
    0.9
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_secs: default_timeout_secs(),
            requests_per_minute: None,
        }
    }
}

impl GatewayConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            concurrency_cap: None,
            shot_mode: ShotMode::default(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            warning_threshold: default_warning_threshold(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.annotator/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        // Serialize before processing so the file keeps the portable ~ form
        let mut config = Self::default_config();
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.annotator/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".annotator").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            llm: LLMConfig::default(),
            gateway: GatewayConfig::default(),
            scheduler: SchedulerConfig::default(),
            memory: MemoryConfig::default(),
            sessions: SessionsConfig::default(),
            prompts: PromptsConfig::default(),
        }
    }

    /// Directory holding session transcripts
    pub fn sessions_dir(&self) -> PathBuf {
        self.core.data_dir.join("sessions")
    }

    /// Directory holding per-task output files
    pub fn output_dir(&self, task: &str) -> PathBuf {
        self.core.data_dir.join("tasks").join(task).join("output")
    }

    /// Resolve the API key from the inline value or the configured env var
    pub fn api_key(&self) -> Option<String> {
        self.llm
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(&self.llm.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates log level, thresholds, and counts
    /// - Expands ~ in paths
    /// - Creates the data directory if it doesn't exist
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        self.validate()?;

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        if let Some(template_file) = &self.prompts.template_file {
            self.prompts.template_file = Some(expand_path(template_file)?);
        }

        Ok(())
    }

    /// Check values without touching the file system
    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.memory.warning_threshold <= 0.0 || self.memory.warning_threshold > 1.0 {
            return Err(EngineError::Config(
                "warning_threshold must be greater than 0.0 and at most 1.0".to_string(),
            ));
        }

        if self.gateway.max_attempts == 0 {
            return Err(EngineError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        if self.gateway.timeout_secs == 0 {
            return Err(EngineError::Config(
                "timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.gateway.requests_per_minute == Some(0) {
            return Err(EngineError::Config(
                "requests_per_minute must be at least 1 when set".to_string(),
            ));
        }

        if self.scheduler.concurrency_cap == Some(0) {
            return Err(EngineError::Config(
                "concurrency_cap must be at least 1 when set".to_string(),
            ));
        }

        if self.scheduler.strategies.is_empty() {
            return Err(EngineError::Config(
                "at least one strategy must be selected".to_string(),
            ));
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
