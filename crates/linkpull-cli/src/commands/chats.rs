use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info};

use linkpull_config::LinkConfig;
use linkpull_core::report::{message_stats, sender_id};
use linkpull_core::{
    BatchReport, BatchRunner, CheckpointStore, Direction, FetchStatus, IdentifierSpec, PageRun,
    PaginationState, Record, Registry,
};
use linkpull_http::ApiClient;
use linkpull_state::{ArchiveContent, ArchiveWriter};

use crate::cli::ResumeArgs;
use crate::commands::messages::{message_created_at, message_job, MessageQuery};
use crate::runner::{archive, archive_document, archive_time, cell, file_component, resolve_resume};
use crate::summary::print_failures;

/// One row of the chat input file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatRow {
    pub chat_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub organization_id: String,
    #[serde(default)]
    pub discovered_via_user_id: String,
    #[serde(default)]
    pub owner_id: String,
}

impl ChatRow {
    pub fn with_id(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            ..Self::default()
        }
    }

    /// User to read the history as: the discovering user, else the owner.
    pub fn viewer_id(&self) -> Option<&str> {
        [&self.discovered_via_user_id, &self.owner_id]
            .into_iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty() && *s != "unknown")
    }
}

/// Read the chat list, dropping blank and repeated chat ids.
pub fn read_chats(path: &Path) -> Result<Vec<ChatRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open chat list {}", path.display()))?;

    let mut seen = HashSet::new();
    let mut chats = Vec::new();
    for (line, row) in reader.deserialize::<ChatRow>().enumerate() {
        let row = row.with_context(|| format!("Invalid row {} in {}", line + 2, path.display()))?;
        let id = row.chat_id.trim().to_string();
        if id.is_empty() || !seen.insert(id.clone()) {
            continue;
        }
        chats.push(ChatRow { chat_id: id, ..row });
    }
    Ok(chats)
}

/// Checkpoint key of a batch: derived from the input file or the single chat.
pub fn batch_key(input: Option<&Path>, chat_id: Option<&str>) -> String {
    match (input, chat_id) {
        (Some(path), _) => {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "input".to_string());
            format!("chats-{}", stem)
        }
        (None, Some(id)) => format!("chats-{}", id),
        (None, None) => "chats".to_string(),
    }
}

/// Tag each message with the chat it came from so merged batch records keep it.
fn tag_records(records: &mut [Record], chat: &ChatRow) {
    for record in records {
        record.insert("chat_id".into(), Value::String(chat.chat_id.clone()));
        if !chat.name.is_empty() {
            record.insert("chat_name".into(), Value::String(chat.name.clone()));
        }
        if !chat.organization_id.is_empty() {
            record.insert("organization_id".into(), Value::String(chat.organization_id.clone()));
        }
    }
}

/// Flat rows over the whole batch.
pub fn batch_rows(records: &[Record]) -> ArchiveContent {
    let headers = ["chat_id", "chat_name", "organization_id", "authorId", "text", "createdAt"];
    ArchiveContent::Csv {
        headers: headers.iter().map(|h| h.to_string()).collect(),
        rows: records
            .iter()
            .map(|r| {
                vec![
                    cell(r.get("chat_id")),
                    cell(r.get("chat_name")),
                    cell(r.get("organization_id")),
                    sender_id(r).unwrap_or_default(),
                    cell(r.get("text")),
                    message_created_at(r),
                ]
            })
            .collect(),
    }
}

/// Fetch every chat's history as one checkpointed batch.
#[allow(clippy::too_many_arguments)]
pub fn run_chat_batch<C, S>(
    client: &C,
    store: &S,
    writer: &ArchiveWriter,
    registry: &Registry,
    config: &LinkConfig,
    key: &str,
    chats: &[ChatRow],
    max_messages: usize,
    resume: ResumeArgs,
) -> Result<BatchReport>
where
    C: ApiClient + ?Sized,
    S: CheckpointStore,
{
    let mut jobs = BTreeMap::new();
    for chat in chats {
        let query = MessageQuery {
            chat_id: chat.chat_id.clone(),
            viewer_id: chat.viewer_id().map(str::to_string),
            direction: Direction::Before,
            from_message_id: None,
            max_messages,
        };
        jobs.insert(chat.chat_id.as_str(), (chat, message_job(registry, config, &query)?));
    }
    let resources: Vec<String> = chats.iter().map(|c| c.chat_id.clone()).collect();
    let checkpoint = resolve_resume(store, key, resume)?;
    let runner = BatchRunner::new(store, key).with_checkpoint_every(config.pagination.checkpoint_every);
    let identify = IdentifierSpec::messages();
    let now = archive_time();

    let report = runner.run(
        &resources,
        checkpoint,
        |r: &Record| identify.extract(r),
        |chat_id| {
            // resources come from the same list as the jobs
            let Some((chat, job)) = jobs.get(chat_id) else {
                return PageRun {
                    state: PaginationState::default(),
                    status: FetchStatus::Stalled,
                    requests: 0,
                };
            };
            let mut run = job.run(client, None);
            tag_records(&mut run.state.accumulated, chat);

            if !run.records().is_empty() {
                let stats = message_stats(run.records());
                println!(
                    "  {} {}: {} messages, avg length {:.2}, {} senders",
                    "chat".cyan(),
                    chat.chat_id,
                    stats.message_count,
                    stats.average_message_length,
                    stats.unique_senders
                );
                let prefix = format!("chat_{}", file_component(&chat.chat_id));
                let document = archive_document(&chat.chat_id, &job.spec.path, &run);
                if let Err(err) = archive(writer, "chats", &prefix, &ArchiveContent::Json(document), now) {
                    error!(chat_id, error = %err, "Failed to archive chat");
                }
            }
            run
        },
    )?;

    Ok(report)
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_chats<C, S>(
    client: &C,
    store: &S,
    writer: &ArchiveWriter,
    registry: &Registry,
    config: &LinkConfig,
    input: Option<&Path>,
    chat_id: Option<&str>,
    max_messages: usize,
    resume: ResumeArgs,
) -> Result<()>
where
    C: ApiClient + ?Sized,
    S: CheckpointStore,
{
    let chats = match (input, chat_id) {
        (Some(path), _) => read_chats(path)?,
        (None, Some(id)) => vec![ChatRow::with_id(id)],
        (None, None) => anyhow::bail!("Pass --input <csv> or --chat-id <id>"),
    };
    if chats.is_empty() {
        println!("No chats to fetch.");
        return Ok(());
    }

    let key = batch_key(input, chat_id);
    info!(key = %key, chats = chats.len(), max_messages, "Starting chat batch");

    let report = run_chat_batch(client, store, writer, registry, config, &key, &chats, max_messages, resume)
        .context("Chat batch could not run; the last checkpoint is kept")?;

    let now = archive_time();
    let all = serde_json::json!({
        "batch": key,
        "chats": report.total,
        "count": report.records().len(),
        "failures": report.failures,
        "items": report.records(),
    });
    archive(writer, "chats", "all_messages", &ArchiveContent::Json(all), now)?;
    archive(writer, "chats", "all_messages_flat", &batch_rows(report.records()), now)?;

    println!(
        "\n{} {} chats ({} skipped from checkpoint), {} messages, {} checkpoint saves",
        "Batch complete:".green().bold(),
        report.processed,
        report.skipped,
        report.records().len(),
        report.checkpoint_saves
    );
    let truncated: Vec<&str> = report.truncated().collect();
    if !truncated.is_empty() {
        println!("{} {}", "Hit message cap:".yellow(), truncated.join(", "));
    }
    print_failures(&report.failures, &report.histogram);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkpull_core::{ErrorKind, MemoryCheckpointStore};
    use linkpull_http::MockClient;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn config() -> LinkConfig {
        LinkConfig::parse("[pagination]\nthrottle_ms = 0\nmessage_page_size = 10\ncheckpoint_every = 2\n")
            .unwrap()
    }

    #[test]
    fn test_read_chats() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chats.csv");
        fs::write(
            &path,
            "chat_id,name,type,organization_id,discovered_via_user_id,owner_id\n\
             c1,General,channel,o1,unknown,u7\n\
             c2,,dialog,o1,u3,\n\
             c1,General,channel,o1,,\n\
             ,blank,,,,\n",
        )
        .unwrap();

        let chats = read_chats(&path).unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].viewer_id(), Some("u7"));
        assert_eq!(chats[1].viewer_id(), Some("u3"));
        assert_eq!(chats[1].kind, "dialog");
    }

    #[test]
    fn test_read_chats_only_id_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ids.csv");
        fs::write(&path, "chat_id\na\nb\n").unwrap();
        let chats = read_chats(&path).unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].viewer_id(), None);
    }

    #[test]
    fn test_batch_key() {
        assert_eq!(batch_key(Some(Path::new("in/active.csv")), None), "chats-active");
        assert_eq!(batch_key(None, Some("c9")), "chats-c9");
    }

    #[test]
    fn test_batch_isolates_failures_and_tags_records() {
        let registry = Registry::builtin();
        let client = MockClient::new();
        client.respond("/chats/channel/a/messages", json!({"data": {"items": [{"id": "1", "text": "x"}]}}));
        client.fail_status("/chats/channel/b/messages", 403);
        client.respond("/chats/channel/c/messages", json!({"data": {"items": [{"id": "2", "authorId": "u"}]}}));
        let store = MemoryCheckpointStore::new();
        let dir = TempDir::new().unwrap();
        let writer = ArchiveWriter::new(dir.path());
        let chats = vec![
            ChatRow { name: "A".into(), ..ChatRow::with_id("a") },
            ChatRow::with_id("b"),
            ChatRow::with_id("c"),
        ];

        let report = run_chat_batch(
            &client, &store, &writer, &registry, &config(), "chats-test", &chats, 100,
            ResumeArgs::default(),
        )
        .unwrap();

        assert_eq!(report.records().len(), 2);
        assert_eq!(report.histogram.get(ErrorKind::PermissionDenied), 1);
        assert_eq!(report.records()[0]["chat_name"], json!("A"));
        assert_eq!(report.records()[1]["chat_id"], json!("c"));
        // failure boundary and cadence at 2 both save
        assert_eq!(store.saves(), 1);
        assert!(store.load("chats-test").unwrap().is_none());

        let archived = fs::read_dir(dir.path().join("chats")).unwrap().count();
        assert_eq!(archived, 2);

        let ArchiveContent::Csv { rows, .. } = batch_rows(report.records()) else {
            panic!("expected csv");
        };
        assert_eq!(rows[1], vec!["c", "", "", "u", "", ""]);
    }

    #[test]
    fn test_cmd_chats_single_chat() {
        let registry = Registry::builtin();
        let client = MockClient::new();
        client.respond("/chats/channel/solo/messages", json!([{"id": "m1"}]));
        let store = MemoryCheckpointStore::new();
        let dir = TempDir::new().unwrap();
        let writer = ArchiveWriter::new(dir.path());

        cmd_chats(&client, &store, &writer, &registry, &config(), None, Some("solo"), 100, ResumeArgs::default())
            .unwrap();

        let names: Vec<String> = fs::read_dir(dir.path().join("chats"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 3, "per-chat archive plus combined json and csv: {names:?}");
    }
}
