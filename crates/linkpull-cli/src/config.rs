use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use linkpull_config::LinkConfig;
use linkpull_core::Registry;
use linkpull_http::{HttpClient, HttpSettings, RetryPolicy};
use linkpull_state::{ArchiveWriter, FileCheckpointStore};

use crate::env::{get_checkpoint_every, get_max_retries, get_throttle_ms};

/// Read and validate the project file, then apply environment overrides.
pub fn load_config(path: &Path) -> Result<LinkConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = LinkConfig::parse(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Like [`load_config`], but a missing file means all defaults.
/// For commands that only touch local state.
pub fn load_config_or_default(path: &Path) -> Result<LinkConfig> {
    if path.exists() {
        return load_config(path);
    }
    debug!(path = %path.display(), "No config file, using defaults");
    let mut config = LinkConfig::default();
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load the project for a command. `required` is false for commands that only
/// touch local state. `output` replaces the configured data directory.
pub fn load_project(path: &Path, output: Option<&Path>, required: bool) -> Result<LinkConfig> {
    let mut config = if required {
        load_config(path)?
    } else {
        load_config_or_default(path)?
    };
    if let Some(dir) = output {
        config.output.data_dir = dir.to_string_lossy().into_owned();
    }
    Ok(config)
}

pub fn apply_env_overrides(config: &mut LinkConfig) {
    if let Some(attempts) = get_max_retries() {
        config.retry.max_attempts = attempts;
    }
    if let Some(throttle_ms) = get_throttle_ms() {
        config.pagination.throttle_ms = throttle_ms;
    }
    if let Some(every) = get_checkpoint_every() {
        config.pagination.checkpoint_every = every;
    }
}

pub fn retry_policy(config: &LinkConfig) -> RetryPolicy {
    RetryPolicy::new(
        config.retry.max_attempts,
        Duration::from_millis(config.retry.base_delay_ms),
        Duration::from_millis(config.retry.max_delay_ms),
    )
}

pub fn http_client(config: &LinkConfig) -> Result<HttpClient> {
    let base_url = config.base_url()?;
    let token = config
        .api_token()
        .context("API token is not configured (set LINK_API_TOKEN or api.token)")?;

    info!(base_url = %base_url, timeout_secs = config.api.timeout_secs, "Connecting to API");
    HttpClient::new(HttpSettings {
        base_url,
        token,
        timeout: config.api.timeout(),
        accept_invalid_certs: config.api.accept_invalid_certs,
        retry: retry_policy(config),
    })
    .context("Failed to build HTTP client")
}

/// Built-in endpoints plus the ones declared in the project file.
pub fn registry(config: &LinkConfig) -> Result<Registry> {
    linkpull_config::build_registry(config).context("Invalid endpoint declarations")
}

pub fn checkpoint_store(config: &LinkConfig) -> Result<FileCheckpointStore> {
    let dir = config.checkpoint_dir()?;
    FileCheckpointStore::open(&dir)
        .with_context(|| format!("Failed to open checkpoint directory {}", dir.display()))
}

pub fn archive_writer(config: &LinkConfig) -> Result<ArchiveWriter> {
    Ok(ArchiveWriter::new(config.data_dir()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_load_config_applies_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("linkpull.toml");
        fs::write(&path, "[pagination]\nthrottle_ms = 250\ncheckpoint_every = 4\n").unwrap();

        std::env::set_var("LINKPULL_THROTTLE_MS", "0");
        let config = load_config(&path).unwrap();
        std::env::remove_var("LINKPULL_THROTTLE_MS");

        assert_eq!(config.pagination.throttle_ms, 0);
        assert_eq!(config.pagination.checkpoint_every, 4);
    }

    #[test]
    #[serial]
    fn test_missing_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));

        let config = load_config_or_default(&path).unwrap();
        assert_eq!(config.output.data_dir, "data");
    }

    #[test]
    #[serial]
    fn test_load_project_output_override() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        let out = dir.path().join("exports");

        assert!(load_project(&path, None, true).is_err());
        let config = load_project(&path, Some(&out), false).unwrap();
        assert_eq!(config.data_dir().unwrap(), out);
        assert_eq!(config.checkpoint_dir().unwrap(), out.join("checkpoints"));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = LinkConfig::parse("[retry]\nmax_attempts = 2\nbase_delay_ms = 10\nmax_delay_ms = 40\n").unwrap();
        let policy = retry_policy(&config);
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.delay_for(5), Duration::from_millis(40));
    }
}
