use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AiflowError, Result};

/// Top-level AIFlow configuration (`aiflow.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Routing hops allowed before a run is truncated.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Copy the per-step trace into `context.__trace`.
    #[serde(default = "default_embed_trace")]
    pub embed_trace: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            embed_trace: default_embed_trace(),
        }
    }
}

fn default_max_steps() -> usize { 50 }
fn default_embed_trace() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Fallback key for `api_key` auth without its own key.
    #[serde(default)]
    pub global_api_key: Option<String>,
    /// Per-request timeout for HTTP tools.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            global_api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ToolsConfig {
    /// The global key, ignoring blanks and unexpanded `${VAR}` references.
    pub fn api_key(&self) -> Option<&str> {
        self.global_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty() && !k.starts_with("${"))
    }
}

fn default_timeout_secs() -> u64 { 30 }

/// JSONL run logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Directory for log files. Default: `logs`
    #[serde(default = "default_log_dir")]
    pub dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_log_dir(),
        }
    }
}

fn default_log_dir() -> String { "logs".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| AiflowError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| AiflowError::Config(e.to_string()))
    }

    /// Like [`AppConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the log directory (expand ~).
    pub fn log_dir(&self) -> PathBuf {
        let dir = &self.log.dir;
        if let Some(rest) = dir.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(dir)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Unset variables stay verbatim.
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
