use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};
use crate::validation::validate_config;

pub const DEFAULT_BASE_URL: &str = "https://api.mts-link.ru/v3";

/// Project configuration as parsed from linkpull.toml.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    /// Endpoints added on top of the built-in catalog.
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

impl LinkConfig {
    /// Parse and validate a config from a TOML string.
    pub fn parse(toml_str: &str) -> ConfigResult<Self> {
        let config: LinkConfig = toml::from_str(toml_str)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// The API token with `${VAR}` placeholders resolved.
    pub fn api_token(&self) -> ConfigResult<String> {
        let token = resolve_env(&self.api.token)?;
        if token.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api.token".into(),
                message: "token is empty".into(),
            });
        }
        Ok(token)
    }

    pub fn base_url(&self) -> ConfigResult<String> {
        Ok(resolve_env(&self.api.base_url)?.trim_end_matches('/').to_string())
    }

    pub fn data_dir(&self) -> ConfigResult<PathBuf> {
        Ok(PathBuf::from(resolve_env(&self.output.data_dir)?))
    }

    /// Directory holding checkpoint files.
    pub fn checkpoint_dir(&self) -> ConfigResult<PathBuf> {
        Ok(self.data_dir()?.join("checkpoints"))
    }
}

/// REST API connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Sent as the `x-auth-token` header. Usually `${LINK_API_TOKEN}`.
    #[serde(default = "default_token")]
    pub token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Skip TLS certificate verification.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: default_token(),
            timeout_secs: default_timeout_secs(),
            accept_invalid_certs: false,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_token() -> String {
    "${LINK_API_TOKEN}".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Where archives and checkpoints are written.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

/// Retry policy for transient network failures.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Ceiling for a single wait.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8000
}

/// Paging and checkpoint cadence.
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    /// Pause between page requests.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    /// Top-level resources between checkpoint saves.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
    #[serde(default = "default_message_page_size")]
    pub message_page_size: usize,
    /// Page size for `page`/`perPage` endpoints.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl PaginationConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            throttle_ms: default_throttle_ms(),
            checkpoint_every: default_checkpoint_every(),
            message_page_size: default_message_page_size(),
            page_size: default_page_size(),
        }
    }
}

fn default_throttle_ms() -> u64 {
    100
}

fn default_checkpoint_every() -> usize {
    10
}

fn default_message_page_size() -> usize {
    100
}

fn default_page_size() -> usize {
    250
}

/// An extra endpoint declared in the project file.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Top-level key holding the item list.
    #[serde(default)]
    pub plural_key: Option<String>,
    /// Path tried once when `path` answers 404.
    #[serde(default)]
    pub fallback: Option<String>,
}

/// Resolve `${VAR_NAME}` placeholders from the environment.
/// A referenced variable that is not set is an error.
pub fn resolve_env(s: &str) -> ConfigResult<String> {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| ConfigError::UnterminatedPlaceholder {
                value: s.to_string(),
            })?;
        let name = &after[..end];
        let value = std::env::var(name).map_err(|_| ConfigError::MissingEnvVar {
            name: name.to_string(),
        })?;
        result.push_str(&value);
        rest = &after[end + 1..];
    }
    result.push_str(rest);

    Ok(result)
}
