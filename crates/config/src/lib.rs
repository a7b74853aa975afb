//! Configuration loading, validation, and management for DiaryCoach.
//!
//! Loads configuration from `~/.diarycoach/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.diarycoach/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the LLM provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model used for coaching replies
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used for evaluation and reports (defaults to `model`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_model: Option<String>,

    /// Sampling temperature for coaching replies
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per coaching reply
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Context relevance and injection settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Morning protocol settings
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// LLM retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Self-evaluation settings
    #[serde(default)]
    pub evaluation: EvaluationConfig,

    /// Memory store settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Stage profiling settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("analysis_model", &self.analysis_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("context", &self.context)
            .field("protocol", &self.protocol)
            .field("retry", &self.retry)
            .field("evaluation", &self.evaluation)
            .field("memory", &self.memory)
            .field("telemetry", &self.telemetry)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Master switch for context injection
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// A source is fetched only when its relevance score exceeds this
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,

    /// Number of trailing turns the scorer looks at
    #[serde(default = "default_window_turns")]
    pub window_turns: usize,

    /// Character budget for the injected context block
    #[serde(default = "default_budget_chars")]
    pub budget_chars: usize,

    /// Blend the heuristic keyword pass into relevance scores
    #[serde(default)]
    pub heuristic_scoring: bool,

    /// Directory of `.md` documents to draw context from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents_dir: Option<PathBuf>,

    /// Per-document character budget
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,

    /// Maximum documents injected per turn
    #[serde(default = "default_max_documents")]
    pub max_documents: usize,

    /// Minimum document score to be injected
    #[serde(default = "default_min_document_score")]
    pub min_document_score: f32,

    /// Maximum todos injected per turn
    #[serde(default = "default_max_todos")]
    pub max_todos: usize,

    /// Maximum recalled memories per turn
    #[serde(default = "default_max_memories")]
    pub max_memories: usize,
}

fn default_relevance_threshold() -> f32 {
    0.6
}
fn default_window_turns() -> usize {
    5
}
fn default_budget_chars() -> usize {
    2000
}
fn default_chunk_chars() -> usize {
    600
}
fn default_max_documents() -> usize {
    2
}
fn default_min_document_score() -> f32 {
    0.3
}
fn default_max_todos() -> usize {
    5
}
fn default_max_memories() -> usize {
    3
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            relevance_threshold: default_relevance_threshold(),
            window_turns: default_window_turns(),
            budget_chars: default_budget_chars(),
            heuristic_scoring: false,
            documents_dir: None,
            chunk_chars: default_chunk_chars(),
            max_documents: default_max_documents(),
            min_document_score: default_min_document_score(),
            max_todos: default_max_todos(),
            max_memories: default_max_memories(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Markdown protocol description; the built-in morning protocol is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_file: Option<PathBuf>,

    /// Exchanges allowed in one phase before a nudge is emitted
    #[serde(default = "default_nudge_after")]
    pub nudge_after: u32,
}

fn default_nudge_after() -> u32 {
    3
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            description_file: None,
            nudge_after: default_nudge_after(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay; doubles on every further attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-analyzer timeout
    #[serde(default = "default_eval_timeout_secs")]
    pub timeout_secs: u64,

    /// Analyzers allowed to run at once
    #[serde(default = "default_eval_concurrency")]
    pub max_concurrency: usize,
}

fn default_eval_timeout_secs() -> u64 {
    5
}
fn default_eval_concurrency() -> usize {
    4
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_eval_timeout_secs(),
            max_concurrency: default_eval_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "in_memory" or "file"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// JSONL path for the file backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Store a record of each session at wrap-up
    #[serde(default = "default_true")]
    pub save_sessions: bool,
}

fn default_memory_backend() -> String {
    "in_memory".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: None,
            save_sessions: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.diarycoach/config.toml).
    ///
    /// Environment overrides:
    /// - `DIARYCOACH_API_KEY`, then `ANTHROPIC_API_KEY` (when the file has no key)
    /// - `DIARYCOACH_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("DIARYCOACH_API_KEY")
                .ok()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("DIARYCOACH_MODEL") {
            config.model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".diarycoach")
    }

    /// Model for evaluation and report calls.
    pub fn analysis_model(&self) -> &str {
        self.analysis_model.as_deref().unwrap_or(&self.model)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.context.relevance_threshold) {
            return Err(ConfigError::ValidationError(
                "context.relevance_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.context.min_document_score) {
            return Err(ConfigError::ValidationError(
                "context.min_document_score must be between 0.0 and 1.0".into(),
            ));
        }

        if self.context.window_turns == 0 {
            return Err(ConfigError::ValidationError(
                "context.window_turns must be at least 1".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        if self.evaluation.max_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "evaluation.max_concurrency must be at least 1".into(),
            ));
        }

        if !matches!(self.memory.backend.as_str(), "in_memory" | "file") {
            return Err(ConfigError::ValidationError(format!(
                "memory.backend must be \"in_memory\" or \"file\", got \"{}\"",
                self.memory.backend
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            analysis_model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            context: ContextConfig::default(),
            protocol: ProtocolConfig::default(),
            retry: RetryConfig::default(),
            evaluation: EvaluationConfig::default(),
            memory: MemoryConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
