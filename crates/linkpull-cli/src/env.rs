use anyhow::{Context, Result};
use tracing::{info, warn};

/// Name of the dotenv file for an optional environment: `.env` or `.env.{name}`.
pub fn env_file_name(env: Option<&str>) -> String {
    match env {
        Some(name) => format!(".env.{}", name),
        None => ".env".to_string(),
    }
}

/// Load the dotenv file from the current directory or any parent directory.
/// Searches from the current working directory up to the filesystem root,
/// loading the first file found.
pub fn load_dotenv_from_ancestors(env: Option<&str>) -> Result<()> {
    let file_name = env_file_name(env);
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    let mut current = cwd.as_path();
    loop {
        let env_path = current.join(&file_name);
        if env_path.exists() {
            dotenvy::from_path(&env_path)
                .with_context(|| format!("Failed to load {} from {}", file_name, env_path.display()))?;
            info!("Loaded {} from {}", file_name, env_path.display());
            return Ok(());
        }

        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }

    anyhow::bail!(
        "No {} file found.\n\n\
        Searched from {} to filesystem root.\n\n\
        Hint: Create a {} file with your API token:\n\
        \n  \
        LINK_API_TOKEN=your-api-token\n\n\
        Or run 'linkpull init' to create an example.",
        file_name,
        cwd.display(),
        file_name
    )
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "Ignoring invalid environment override");
            None
        }
    }
}

/// LINKPULL_MAX_RETRIES: total attempts per request.
pub fn get_max_retries() -> Option<u32> {
    parse_env::<u32>("LINKPULL_MAX_RETRIES").filter(|n| *n >= 1)
}

/// LINKPULL_THROTTLE_MS: pause between page requests.
pub fn get_throttle_ms() -> Option<u64> {
    parse_env("LINKPULL_THROTTLE_MS")
}

/// LINKPULL_CHECKPOINT_EVERY: resources between checkpoint saves.
pub fn get_checkpoint_every() -> Option<usize> {
    parse_env::<usize>("LINKPULL_CHECKPOINT_EVERY").filter(|n| *n >= 1)
}
