use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use tracing::info;

const ENV_EXAMPLE: &str = r#"# linkpull environment variables
# Copy this file to .env and fill in your values

# API token, sent as the x-auth-token header
LINK_API_TOKEN=

# Optional overrides of linkpull.toml
# LINKPULL_MAX_RETRIES=5
# LINKPULL_THROTTLE_MS=100
# LINKPULL_CHECKPOINT_EVERY=10
"#;

const CONFIG: &str = r#"# linkpull configuration
# Secrets are loaded from .env

[api]
base_url = "https://api.mts-link.ru/v3"
token = "${LINK_API_TOKEN}"
timeout_secs = 30

[output]
# Archives go under this directory, checkpoints under <data_dir>/checkpoints
data_dir = "data"

[retry]
max_attempts = 5
base_delay_ms = 500
max_delay_ms = 8000

[pagination]
throttle_ms = 100
checkpoint_every = 10
message_page_size = 100
page_size = 250

# Extra endpoints on top of the built-in catalog
# [[endpoints]]
# name = "event-polls"
# path = "/eventsessions/{eventSessionId}/polls"
# plural_key = "polls"
"#;

pub fn cmd_init(dir: &Path) -> Result<()> {
    println!("Initializing linkpull in {}...\n", dir.display());

    write_if_missing(&dir.join(".env.example"), ENV_EXAMPLE)?;
    write_if_missing(&dir.join("linkpull.toml"), CONFIG)?;

    // keep secrets out of version control
    let gitignore = dir.join(".gitignore");
    if gitignore.exists() {
        let content = fs::read_to_string(&gitignore)?;
        if !content.lines().any(|l| l.trim() == ".env") {
            let mut file = fs::OpenOptions::new().append(true).open(&gitignore)?;
            writeln!(file, "\n# linkpull secrets and output\n.env\ndata/")?;
            println!("Added .env to .gitignore");
        }
    } else {
        fs::write(&gitignore, "# linkpull secrets and output\n.env\ndata/\n")?;
        println!("Created .gitignore");
    }

    println!("\n{}\n", "linkpull initialized!".green().bold());
    println!("Next steps:");
    println!("  1. Copy .env.example to .env and set LINK_API_TOKEN");
    println!("  2. Run: linkpull list");
    println!("  3. Run: linkpull messages --chat-id <id>\n");
    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if path.exists() {
        println!("{} already exists, skipping", name);
    } else {
        fs::write(path, content)?;
        info!(path = %path.display(), "Created file");
        println!("Created {}", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkpull_config::LinkConfig;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_valid_config() {
        let dir = TempDir::new().unwrap();
        cmd_init(dir.path()).unwrap();

        let content = fs::read_to_string(dir.path().join("linkpull.toml")).unwrap();
        let config = LinkConfig::parse(&content).unwrap();
        assert_eq!(config.api.token, "${LINK_API_TOKEN}");
        assert!(dir.path().join(".env.example").exists());

        let gitignore = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert!(gitignore.contains(".env"));
    }

    #[test]
    fn test_init_keeps_existing_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("linkpull.toml"), "# mine\n").unwrap();
        fs::write(dir.path().join(".gitignore"), "target/\n.env\n").unwrap();

        cmd_init(dir.path()).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("linkpull.toml")).unwrap(), "# mine\n");
        assert_eq!(fs::read_to_string(dir.path().join(".gitignore")).unwrap(), "target/\n.env\n");
    }
}
