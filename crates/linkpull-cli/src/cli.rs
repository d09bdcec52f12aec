use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use linkpull_core::Direction;

#[derive(Parser)]
#[command(name = "linkpull")]
#[command(about = "Export chats, members and call activity from the webinar platform API")]
#[command(version)]
pub struct Cli {
    /// Environment to load (loads .env.{ENV} instead of .env)
    #[arg(short, long, global = true)]
    pub env: Option<String>,

    /// Path to the project config file
    #[arg(short, long, global = true, default_value = "linkpull.toml")]
    pub config: PathBuf,

    /// Directory for archives and checkpoints (overrides output.data_dir)
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create linkpull.toml and .env.example in the current directory
    Init,

    /// List the known endpoints
    List,

    /// Fetch one endpoint (or every endpoint without parameters) and archive the response
    Extract {
        /// Endpoint name as shown by `linkpull list`
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        name: Option<String>,

        /// Path or query parameter, `key=value`. Repeatable.
        #[arg(long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,

        /// Fetch every endpoint that needs no path parameters
        #[arg(long)]
        all: bool,
    },

    /// Fetch the message history of one chat
    Messages {
        /// Chat (channel) identifier
        #[arg(long)]
        chat_id: String,

        /// User the history is read as
        #[arg(long)]
        viewer_id: Option<String>,

        /// Before, After or Around
        #[arg(long, default_value = "Before")]
        direction: Direction,

        /// Message to start from
        #[arg(long)]
        from_message_id: Option<String>,

        /// Upper bound on messages fetched
        #[arg(long, default_value = "50000")]
        max_messages: usize,

        #[command(flatten)]
        resume: ResumeArgs,
    },

    /// Fetch all organization members
    Members {
        /// Upper bound on pages requested
        #[arg(long, default_value = "100")]
        max_pages: usize,

        #[command(flatten)]
        resume: ResumeArgs,
    },

    /// Fetch the users of one chat channel
    ChannelUsers {
        /// Chat (channel) identifier
        #[arg(long)]
        chat_id: String,

        /// Upper bound on pages requested
        #[arg(long, default_value = "100")]
        max_pages: usize,

        #[command(flatten)]
        resume: ResumeArgs,
    },

    /// Fetch call activity in endless rooms
    Activities {
        /// Start of the window (passed through as `from`)
        #[arg(long, conflicts_with = "last_days")]
        from: Option<String>,

        /// End of the window (passed through as `to`)
        #[arg(long, conflicts_with = "last_days")]
        to: Option<String>,

        /// Window ending now, this many days long
        #[arg(long)]
        last_days: Option<u32>,

        /// Upper bound on pages requested
        #[arg(long, default_value = "100")]
        max_pages: usize,

        #[command(flatten)]
        resume: ResumeArgs,
    },

    /// Fetch the message history of many chats with checkpointing
    Chats {
        /// CSV with a chat_id column (and optionally name, organization_id, discovered_via_user_id, owner_id)
        #[arg(long, required_unless_present = "chat_id", conflicts_with = "chat_id")]
        input: Option<PathBuf>,

        /// A single chat instead of an input file
        #[arg(long)]
        chat_id: Option<String>,

        /// Upper bound on messages fetched per chat
        #[arg(long, default_value = "50000")]
        max_messages: usize,

        #[command(flatten)]
        resume: ResumeArgs,
    },

    /// Aggregate reports over archived records
    Report {
        #[command(subcommand)]
        kind: ReportKind,
    },

    /// Show saved checkpoints
    Status,

    /// Delete a saved checkpoint
    Discard {
        /// Checkpoint key as shown by `linkpull status`
        key: String,

        /// Don't ask for confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum ReportKind {
    /// Distinct message authors per day
    ActiveUsers {
        /// Archive files or directories to read
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Only count the last N days
        #[arg(long)]
        days_back: Option<u32>,

        #[arg(long, value_enum, default_value = "table")]
        format: ReportFormat,
    },

    /// Messages per day
    MessageVolume {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(long)]
        days_back: Option<u32>,

        #[arg(long, value_enum, default_value = "table")]
        format: ReportFormat,
    },

    /// Total and mean call duration
    CallDuration {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(long, value_enum, default_value = "table")]
        format: ReportFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Table,
    Csv,
}

/// How to treat an existing checkpoint.
#[derive(Debug, Clone, Copy, Default, clap::Args)]
pub struct ResumeArgs {
    /// Continue from a saved checkpoint without asking
    #[arg(long, conflicts_with = "fresh")]
    pub resume: bool,

    /// Ignore and delete a saved checkpoint without asking
    #[arg(long)]
    pub fresh: bool,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("chatId=abc=1").unwrap(),
            ("chatId".to_string(), "abc=1".to_string())
        );
        assert!(parse_key_value("=x").is_err());
        assert!(parse_key_value("novalue").is_err());
    }

    #[test]
    fn test_messages_args() {
        let cli = Cli::try_parse_from([
            "linkpull",
            "messages",
            "--chat-id",
            "c1",
            "--direction",
            "after",
            "--resume",
        ])
        .unwrap();
        match cli.command {
            Commands::Messages {
                chat_id,
                direction,
                max_messages,
                resume,
                ..
            } => {
                assert_eq!(chat_id, "c1");
                assert_eq!(direction, Direction::After);
                assert_eq!(max_messages, 50000);
                assert!(resume.resume);
                assert!(!resume.fresh);
            }
            _ => panic!("expected messages"),
        }
    }

    #[test]
    fn test_resume_and_fresh_conflict() {
        let result = Cli::try_parse_from(["linkpull", "members", "--resume", "--fresh"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_chats_needs_input_or_chat_id() {
        assert!(Cli::try_parse_from(["linkpull", "chats"]).is_err());
        assert!(Cli::try_parse_from(["linkpull", "chats", "--chat-id", "c1"]).is_ok());
    }

    #[test]
    fn test_channel_users_args() {
        let cli = Cli::try_parse_from(["linkpull", "channel-users", "--chat-id", "c1"]).unwrap();
        match cli.command {
            Commands::ChannelUsers { chat_id, max_pages, .. } => {
                assert_eq!(chat_id, "c1");
                assert_eq!(max_pages, 100);
            }
            _ => panic!("expected channel-users"),
        }
        assert!(Cli::try_parse_from(["linkpull", "channel-users"]).is_err());
    }
}
