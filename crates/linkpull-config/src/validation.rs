use std::collections::HashSet;

use linkpull_core::{EndpointSpec, Registry};

use crate::error::{ConfigError, ConfigResult};
use crate::project::{EndpointConfig, LinkConfig};

/// Validate a project configuration.
pub fn validate_config(config: &LinkConfig) -> ConfigResult<()> {
    validate_base_url(config)?;
    validate_retry(config)?;
    validate_pagination(config)?;
    validate_endpoints(&config.endpoints)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

fn validate_base_url(config: &LinkConfig) -> ConfigResult<()> {
    let url = &config.api.base_url;
    // placeholders are checked after resolution
    if url.starts_with("${") {
        return Ok(());
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(invalid("api.base_url", format!("'{url}' must start with http:// or https://")));
    }
    Ok(())
}

fn validate_retry(config: &LinkConfig) -> ConfigResult<()> {
    let retry = &config.retry;
    if retry.max_attempts == 0 {
        return Err(invalid("retry.max_attempts", "must be at least 1"));
    }
    if retry.base_delay_ms > retry.max_delay_ms {
        return Err(invalid(
            "retry.base_delay_ms",
            format!(
                "{} exceeds retry.max_delay_ms ({})",
                retry.base_delay_ms, retry.max_delay_ms
            ),
        ));
    }
    Ok(())
}

fn validate_pagination(config: &LinkConfig) -> ConfigResult<()> {
    let pagination = &config.pagination;
    if pagination.checkpoint_every == 0 {
        return Err(invalid("pagination.checkpoint_every", "must be at least 1"));
    }
    if pagination.message_page_size == 0 {
        return Err(invalid("pagination.message_page_size", "must be at least 1"));
    }
    if pagination.page_size == 0 {
        return Err(invalid("pagination.page_size", "must be at least 1"));
    }
    Ok(())
}

fn validate_endpoints(endpoints: &[EndpointConfig]) -> ConfigResult<()> {
    let mut names = HashSet::new();
    for endpoint in endpoints {
        if !names.insert(endpoint.name.as_str()) {
            return Err(invalid(
                "endpoints",
                format!("endpoint '{}' is declared twice", endpoint.name),
            ));
        }
        if !endpoint.path.starts_with('/') {
            return Err(invalid(
                "endpoints",
                format!("path of '{}' must start with '/'", endpoint.name),
            ));
        }
    }
    Ok(())
}

fn to_spec(endpoint: &EndpointConfig) -> EndpointSpec {
    let mut spec = EndpointSpec::new(&endpoint.name, &endpoint.path, &endpoint.description);
    if let Some(category) = &endpoint.category {
        spec = spec.with_category(category);
    }
    if let Some(key) = &endpoint.plural_key {
        spec = spec.with_plural_key(key);
    }
    if let Some(fallback) = &endpoint.fallback {
        spec = spec.with_fallback(fallback);
    }
    spec
}

/// The built-in catalog plus the project's own endpoints.
pub fn build_registry(config: &LinkConfig) -> ConfigResult<Registry> {
    let mut registry = Registry::builtin();
    for endpoint in &config.endpoints {
        registry.register(to_spec(endpoint))?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_base_url() {
        let err = LinkConfig::parse("[api]\nbase_url = \"ftp://x\"").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "api.base_url"));
    }

    #[test]
    fn test_base_url_placeholder_allowed() {
        assert!(LinkConfig::parse("[api]\nbase_url = \"${LINK_BASE_URL}\"").is_ok());
    }

    #[test]
    fn test_rejects_zero_attempts() {
        assert!(LinkConfig::parse("[retry]\nmax_attempts = 0").is_err());
    }

    #[test]
    fn test_rejects_inverted_delays() {
        let toml = "[retry]\nbase_delay_ms = 5000\nmax_delay_ms = 100";
        assert!(LinkConfig::parse(toml).is_err());
    }

    #[test]
    fn test_rejects_zero_cadence() {
        assert!(LinkConfig::parse("[pagination]\ncheckpoint_every = 0").is_err());
    }

    #[test]
    fn test_rejects_duplicate_endpoints() {
        let toml = r#"
[[endpoints]]
name = "a"
path = "/a"

[[endpoints]]
name = "a"
path = "/b"
"#;
        assert!(LinkConfig::parse(toml).is_err());
    }

    #[test]
    fn test_build_registry_adds_custom_endpoints() {
        let toml = r#"
[[endpoints]]
name = "webinar-polls"
path = "/eventsessions/{eventSessionId}/polls"
category = "events"
"#;
        let config = LinkConfig::parse(toml).unwrap();
        let registry = build_registry(&config).unwrap();
        let spec = registry.get("webinar-polls").unwrap();
        assert_eq!(spec.category, "events");
        assert!(spec.is_parameterized());
        assert!(registry.len() > 1);
    }

    #[test]
    fn test_build_registry_rejects_builtin_name_clash() {
        let toml = r#"
[[endpoints]]
name = "chat-messages"
path = "/other"
"#;
        let config = LinkConfig::parse(toml).unwrap();
        assert!(matches!(
            build_registry(&config),
            Err(ConfigError::EndpointError(_))
        ));
    }
}
