use thiserror::Error;

/// Errors that can occur when parsing or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("environment variable '{name}' is referenced but not set")]
    MissingEnvVar { name: String },

    #[error("unterminated '${{' placeholder in '{value}'")]
    UnterminatedPlaceholder { value: String },

    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("endpoint configuration error: {0}")]
    EndpointError(#[from] linkpull_core::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
