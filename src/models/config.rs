//! Configuration for flowgate.
//!
//! Everything tunable lives in one TOML file: endpoint locations, per-client
//! timeout/retry budgets, and the polling parameters shared by both
//! backends.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// MinRUE inference backend (local, unauthenticated)
    #[serde(default)]
    pub minrue: MinRueConfig,

    /// RAGFlow service (API-key authenticated)
    #[serde(default)]
    pub ragflow: RagflowConfig,

    /// Job polling parameters
    #[serde(default)]
    pub poll: PollConfig,
}

/// MinRUE backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinRueConfig {
    /// Base URL for the MinRUE API
    #[serde(default = "default_minrue_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries on transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Default model for file processing
    #[serde(default = "default_model")]
    pub model: String,

    /// Default task type for file processing
    #[serde(default = "default_task")]
    pub task: String,
}

fn default_minrue_base_url() -> String {
    "http://localhost:8000/v1".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_model() -> String {
    "mistral-7b-instruct".to_string()
}

fn default_task() -> String {
    "text-refinement".to_string()
}

impl Default for MinRueConfig {
    fn default() -> Self {
        Self {
            base_url: default_minrue_base_url(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            model: default_model(),
            task: default_task(),
        }
    }
}

/// RAGFlow service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagflowConfig {
    /// API key (can also be set via the env var named by `api_key_env`)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable name for the API key
    #[serde(default = "default_ragflow_api_key_env")]
    pub api_key_env: String,

    /// Base URL for the RAGFlow API
    #[serde(default = "default_ragflow_base_url")]
    pub base_url: String,

    /// Custom headers to include in requests.
    /// Values can contain ${ENV_VAR} for environment variable expansion.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries on transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_ragflow_api_key_env() -> String {
    "RAGFLOW_API_KEY".to_string()
}

fn default_ragflow_base_url() -> String {
    "http://localhost:9380/api/v1".to_string()
}

impl Default for RagflowConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_ragflow_api_key_env(),
            base_url: default_ragflow_base_url(),
            headers: HashMap::new(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl RagflowConfig {
    /// Resolve the API key from config or environment.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = &self.api_key {
            return Ok(expand_env_vars(key));
        }

        std::env::var(&self.api_key_env).map_err(|_| ConfigError::MissingApiKey {
            service: "ragflow".to_string(),
            env_var: self.api_key_env.clone(),
        })
    }
}

/// Job polling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between successive status checks
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Maximum wall-clock seconds to wait for a terminal status
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,

    /// Maximum simultaneous polls in a batch wait
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_interval() -> u64 {
    3
}

fn default_deadline() -> u64 {
    120
}

fn default_max_concurrent() -> usize {
    8
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            deadline_secs: default_deadline(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();

    for cap in re.captures_iter(s) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Expand environment variables in all header values.
pub fn expand_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| (k.clone(), expand_env_vars(v)))
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing API key for {service}: set {env_var} env var or api_key in config")]
    MissingApiKey { service: String, env_var: String },
}
