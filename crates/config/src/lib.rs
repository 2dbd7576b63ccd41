//! Configuration loading, validation, and management for Chatweave.
//!
//! Loads configuration from `~/.chatweave/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Follow-up instruction sent after a code run while retries remain.
pub const DEFAULT_CODE_SUMMARY_PROMPT: &str = "Based on the most recent code execution output, write a concise wrap up to inform the user what happened:
- Clearly state whether the execution succeeded or failed.
- If any file URLs are available, include a Markdown link to each of the files so the user can download them.
- If there was an error, briefly summarize it in one sentence. If necessary generate adjusted code (Code Interpreter Tool).";

/// Follow-up instruction sent once the code retry budget is spent.
pub const DEFAULT_CODE_FAIL_PROMPT: &str = "Tell the user kindly that it was not possible for you to execute the task with the code interpreter. IMPORTANT! Don't write any new code. It is over. Do not try again to solve the task. Just tell the user that they have to try again.";

/// The root configuration structure.
///
/// Maps directly to `~/.chatweave/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the upstream generation service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Upstream connection settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Stream assembly and tool loop settings
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Code interpreter settings
    #[serde(default)]
    pub code_interpreter: CodeInterpreterConfig,

    /// Live session fan-out settings
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Artifact storage settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Redact a secret string for Debug output.
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
            .field("provider", &self.provider)
            .field("completion", &self.completion)
            .field("code_interpreter", &self.code_interpreter)
            .field("broadcast", &self.broadcast)
            .field("storage", &self.storage)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_provider_timeout() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            default_model: default_model(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Tag names that bound a reasoning trace
    #[serde(default = "default_reasoning_tags")]
    pub reasoning_tags: Vec<String>,

    /// Tag names that bound code for the interpreter
    #[serde(default = "default_code_interpreter_tags")]
    pub code_interpreter_tags: Vec<String>,

    /// Recognize reasoning tags at all
    #[serde(default = "default_true")]
    pub detect_reasoning: bool,

    /// Persist rendered content on every delta
    #[serde(default)]
    pub realtime_save: bool,

    #[serde(default = "default_max_tool_call_retries")]
    pub max_tool_call_retries: u32,
}

fn default_reasoning_tags() -> Vec<String> {
    ["think", "thinking", "reason", "reasoning", "thought", "Thought"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_code_interpreter_tags() -> Vec<String> {
    vec!["code_interpreter".into()]
}
fn default_max_tool_call_retries() -> u32 {
    5
}
fn default_true() -> bool {
    true
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            reasoning_tags: default_reasoning_tags(),
            code_interpreter_tags: default_code_interpreter_tags(),
            detect_reasoning: true,
            realtime_save: false,
            max_tool_call_retries: default_max_tool_call_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeInterpreterConfig {
    /// Execution service endpoint; code blocks stay unexecuted when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_url: Option<String>,

    /// HTTP timeout for one execution request
    #[serde(default = "default_executor_timeout")]
    pub timeout_secs: u64,

    /// Execution limit forwarded to the sandbox
    #[serde(default = "default_sandbox_timeout")]
    pub sandbox_timeout_secs: u64,

    #[serde(default = "default_max_code_retries")]
    pub max_retries: u32,

    /// Attachments larger than this are not staged
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,

    /// Model used for follow-up turns; falls back to the request model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default = "default_summary_prompt")]
    pub summary_prompt: String,

    #[serde(default = "default_fail_prompt")]
    pub fail_prompt: String,
}

fn default_executor_timeout() -> u64 {
    60
}
fn default_sandbox_timeout() -> u64 {
    10
}
fn default_max_code_retries() -> u32 {
    3
}
fn default_max_file_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_summary_prompt() -> String {
    DEFAULT_CODE_SUMMARY_PROMPT.into()
}
fn default_fail_prompt() -> String {
    DEFAULT_CODE_FAIL_PROMPT.into()
}

impl Default for CodeInterpreterConfig {
    fn default() -> Self {
        Self {
            executor_url: None,
            timeout_secs: default_executor_timeout(),
            sandbox_timeout_secs: default_sandbox_timeout(),
            max_retries: default_max_code_retries(),
            max_file_bytes: default_max_file_bytes(),
            model: None,
            summary_prompt: default_summary_prompt(),
            fail_prompt: default_fail_prompt(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Per-session event buffer; events beyond it are dropped
    #[serde(default = "default_session_buffer")]
    pub session_buffer: usize,
}

fn default_session_buffer() -> usize {
    256
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            session_buffer: default_session_buffer(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for produced artifacts; in-memory when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.chatweave/config.toml).
    ///
    /// Environment variables take precedence over the file:
    /// - `CHATWEAVE_API_KEY`, then `OPENAI_API_KEY` (only when the file has no key)
    /// - `CHATWEAVE_API_URL`, `CHATWEAVE_MODEL`
    /// - `PYTHON_EXECUTOR_URL`, `DEFAULT_CODE_INTERPRETER_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
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

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("CHATWEAVE_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(url) = lookup("CHATWEAVE_API_URL") {
            self.provider.api_url = url;
        }
        if let Some(model) = lookup("CHATWEAVE_MODEL") {
            self.provider.default_model = model;
        }
        if let Some(url) = lookup("PYTHON_EXECUTOR_URL") {
            self.code_interpreter.executor_url = Some(url);
        }
        if let Some(model) = lookup("DEFAULT_CODE_INTERPRETER_MODEL") {
            self.code_interpreter.model = Some(model);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".chatweave")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.completion.max_tool_call_retries == 0 {
            return Err(ConfigError::ValidationError(
                "completion.max_tool_call_retries must be at least 1".into(),
            ));
        }
        if self.code_interpreter.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "code_interpreter.max_retries must be at least 1".into(),
            ));
        }
        if self.provider.timeout_secs == 0 || self.code_interpreter.timeout_secs == 0 {
            return Err(ConfigError::ValidationError("timeouts must be > 0".into()));
        }
        if self.code_interpreter.sandbox_timeout_secs == 0 {
            return Err(ConfigError::ZeroSandboxTimeout);
        }
        if self.completion.reasoning_tags.is_empty() {
            return Err(ConfigError::EmptyTagList("completion.reasoning_tags"));
        }
        if self.completion.code_interpreter_tags.is_empty() {
            return Err(ConfigError::EmptyTagList("completion.code_interpreter_tags"));
        }
        let tags = self
            .completion
            .reasoning_tags
            .iter()
            .chain(&self.completion.code_interpreter_tags);
        for tag in tags {
            if !is_valid_tag(tag) {
                return Err(ConfigError::ValidationError(format!("invalid tag name '{tag}'")));
            }
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && !tag
            .chars()
            .any(|c| c == '<' || c == '>' || c == '/' || c.is_whitespace())
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

    #[error("Configuration validation failed: {0} must not be empty")]
    EmptyTagList(&'static str),

    #[error("Configuration validation failed: code_interpreter.sandbox_timeout_secs must be > 0")]
    ZeroSandboxTimeout,
}
