mod error;
mod project;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use project::{
    resolve_env, ApiConfig, EndpointConfig, LinkConfig, OutputConfig, PaginationConfig,
    RetryConfig,
};
pub use validation::{build_registry, validate_config};
