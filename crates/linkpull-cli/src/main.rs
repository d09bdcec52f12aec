mod cli;
mod commands;
mod config;
mod env;
mod runner;
mod summary;

use std::env as std_env;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

use cli::{Cli, Commands};
use commands::{
    cmd_activities, cmd_channel_users, cmd_chats, cmd_discard, cmd_extract, cmd_init, cmd_list,
    cmd_members, cmd_messages, cmd_report, cmd_status, ActivityWindow, MessageQuery,
};
use config::{archive_writer, checkpoint_store, http_client, load_project, registry};
use runner::archive_time;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Only commands that talk to the API need the token file
    let needs_api = matches!(
        cli.command,
        Commands::Extract { .. }
            | Commands::Messages { .. }
            | Commands::Members { .. }
            | Commands::ChannelUsers { .. }
            | Commands::Activities { .. }
            | Commands::Chats { .. }
    );
    let dotenv = env::load_dotenv_from_ancestors(cli.env.as_deref());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("linkpull=info".parse()?),
        )
        .init();

    if let Err(err) = dotenv {
        if needs_api {
            return Err(err);
        }
        warn!("{}", err);
    }

    let output = cli.output.as_deref();
    let project = |required: bool| load_project(&cli.config, output, required);

    match cli.command {
        Commands::Init => cmd_init(&std_env::current_dir()?),
        Commands::List => {
            let config = project(false)?;
            cmd_list(&registry(&config)?)
        }
        Commands::Extract { name, params, all } => {
            let config = project(true)?;
            let client = http_client(&config)?;
            cmd_extract(
                &client,
                &registry(&config)?,
                &archive_writer(&config)?,
                name.as_deref(),
                &params,
                all,
            )
        }
        Commands::Messages {
            chat_id,
            viewer_id,
            direction,
            from_message_id,
            max_messages,
            resume,
        } => {
            let config = project(true)?;
            let client = http_client(&config)?;
            let query = MessageQuery {
                chat_id,
                viewer_id,
                direction,
                from_message_id,
                max_messages,
            };
            cmd_messages(
                &client,
                &checkpoint_store(&config)?,
                &archive_writer(&config)?,
                &registry(&config)?,
                &config,
                &query,
                resume,
            )
        }
        Commands::Members { max_pages, resume } => {
            let config = project(true)?;
            let client = http_client(&config)?;
            cmd_members(
                &client,
                &checkpoint_store(&config)?,
                &archive_writer(&config)?,
                &registry(&config)?,
                &config,
                max_pages,
                resume,
            )
        }
        Commands::ChannelUsers {
            chat_id,
            max_pages,
            resume,
        } => {
            let config = project(true)?;
            let client = http_client(&config)?;
            cmd_channel_users(
                &client,
                &checkpoint_store(&config)?,
                &archive_writer(&config)?,
                &registry(&config)?,
                &config,
                &chat_id,
                max_pages,
                resume,
            )
        }
        Commands::Activities {
            from,
            to,
            last_days,
            max_pages,
            resume,
        } => {
            let config = project(true)?;
            let client = http_client(&config)?;
            let window = ActivityWindow::new(from, to, last_days, archive_time());
            cmd_activities(
                &client,
                &checkpoint_store(&config)?,
                &archive_writer(&config)?,
                &registry(&config)?,
                &config,
                &window,
                max_pages,
                resume,
            )
        }
        Commands::Chats {
            input,
            chat_id,
            max_messages,
            resume,
        } => {
            let config = project(true)?;
            let client = http_client(&config)?;
            cmd_chats(
                &client,
                &checkpoint_store(&config)?,
                &archive_writer(&config)?,
                &registry(&config)?,
                &config,
                input.as_deref(),
                chat_id.as_deref(),
                max_messages,
                resume,
            )
        }
        Commands::Report { kind } => cmd_report(&kind, archive_time().date()),
        Commands::Status => {
            let config = project(false)?;
            cmd_status(&checkpoint_store(&config)?)
        }
        Commands::Discard { key, yes } => {
            let config = project(false)?;
            cmd_discard(&checkpoint_store(&config)?, &key, yes).map(|_| ())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_subcommand_parses() {
        let cli = Cli::try_parse_from([
            "linkpull", "report", "active-users", "data/chats", "--days-back", "30", "--format", "csv",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Report { .. }));
    }
}
