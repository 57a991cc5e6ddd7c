//! Configuration loading, validation, and management for quill.
//!
//! Loads configuration from `~/.quill/config.toml` with environment
//! variable overrides. Validates all settings at load time. The agent core
//! never resolves credentials or file locations itself; this crate is the
//! external collaborator that supplies them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors from configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The root configuration structure.
///
/// Maps directly to `~/.quill/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Which backend drives the session: "remote" or "local"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Default model for the remote backend
    #[serde(default = "default_model")]
    pub model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Maximum orchestrator turns per user instruction (safety cap)
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// How many non-system turns the backend request window keeps
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,

    /// Working root for all file and shell tools. Defaults to the
    /// current directory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Remote backend settings
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Local backend settings
    #[serde(default)]
    pub local: LocalConfig,

    /// Shell tool settings
    #[serde(default)]
    pub shell: ShellConfig,

    /// Session mode flags
    #[serde(default)]
    pub modes: ModesConfig,

    /// Backend retry settings
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_backend() -> String {
    "remote".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_max_turns() -> u32 {
    15
}
fn default_context_turns() -> usize {
    40
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
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_turns", &self.max_turns)
            .field("context_turns", &self.context_turns)
            .field("workspace_root", &self.workspace_root)
            .field("remote", &self.remote)
            .field("local", &self.local)
            .field("shell", &self.shell)
            .field("modes", &self.modes)
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the OpenAI-compatible service
    #[serde(default = "default_remote_url")]
    pub base_url: String,

    /// API key; the QUILL_API_KEY environment variable overrides this
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_remote_url() -> String {
    "https://openrouter.ai/api/v1".into()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_remote_url(),
            api_key: None,
        }
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Address of the local inference service
    #[serde(default = "default_local_url")]
    pub base_url: String,

    /// Model to request from the local service
    #[serde(default = "default_local_model")]
    pub model: String,
}

fn default_local_url() -> String {
    "http://localhost:11434".into()
}
fn default_local_model() -> String {
    "llama3".into()
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            base_url: default_local_url(),
            model: default_local_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Default command timeout when the model does not pass one
    #[serde(default = "default_shell_timeout")]
    pub timeout_secs: u64,

    /// Hard cap on any requested timeout
    #[serde(default = "default_shell_max_timeout")]
    pub max_timeout_secs: u64,

    /// If non-empty, only these base commands are allowed
    #[serde(default)]
    pub allowlist: Vec<String>,
}

fn default_shell_timeout() -> u64 {
    60
}
fn default_shell_max_timeout() -> u64 {
    120
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_shell_timeout(),
            max_timeout_secs: default_shell_max_timeout(),
            allowlist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ModesConfig {
    #[serde(default)]
    pub reasoning: bool,

    #[serde(default)]
    pub planning: bool,

    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub base_delay_ms: u64,
}

fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    500
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            base_delay_ms: default_retry_delay(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        // An empty TOML document yields all serde defaults
        toml::from_str("").expect("defaults are valid")
    }
}

impl AppConfig {
    /// The quill configuration directory (`~/.quill`).
    pub fn config_dir() -> PathBuf {
        home_dir().join(".quill")
    }

    /// Load from the default location with env overrides applied.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_dir().join("config.toml");
        Self::load_from(&path)
    }

    /// Load from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            debug!(path = %path.display(), "Loading config file");
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("QUILL_API_KEY")
            && !key.is_empty()
        {
            self.remote.api_key = Some(key);
        }
        if let Ok(backend) = std::env::var("QUILL_BACKEND")
            && !backend.is_empty()
        {
            self.backend = backend;
        }
        if let Ok(model) = std::env::var("QUILL_MODEL")
            && !model.is_empty()
        {
            self.model = model;
        }
        if let Ok(root) = std::env::var("QUILL_WORKSPACE")
            && !root.is_empty()
        {
            self.workspace_root = Some(PathBuf::from(root));
        }
    }

    /// Validate settings; called on every load.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend != "remote" && self.backend != "local" {
            return Err(ConfigError::Invalid(format!(
                "backend must be \"remote\" or \"local\", got \"{}\"",
                self.backend
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be in [0.0, 2.0], got {}",
                self.temperature
            )));
        }
        if self.max_turns == 0 {
            return Err(ConfigError::Invalid("max_turns must be at least 1".into()));
        }
        if self.shell.max_timeout_secs < self.shell.timeout_secs {
            return Err(ConfigError::Invalid(
                "shell.max_timeout_secs must be >= shell.timeout_secs".into(),
            ));
        }
        Ok(())
    }

    /// The working root for file and shell tools.
    pub fn resolve_workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    /// The model matching the active backend.
    pub fn active_model(&self) -> &str {
        if self.backend == "local" {
            &self.local.model
        } else {
            &self.model
        }
    }
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}
