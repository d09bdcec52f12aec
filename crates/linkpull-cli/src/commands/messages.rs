use anyhow::Result;
use tracing::info;

use linkpull_config::LinkConfig;
use linkpull_core::registry::CHAT_MESSAGES;
use linkpull_core::report::{format_timestamp_ms, sender_id};
use linkpull_core::{
    CheckpointStore, Direction, FetchRequest, IdentifierSpec, PaginationOptions, Paginator, Paging,
    Record, Registry,
};
use linkpull_http::{ApiClient, Params};
use linkpull_state::{ArchiveContent, ArchiveWriter};
use serde_json::Value;

use crate::cli::ResumeArgs;
use crate::runner::{archive, archive_document, archive_time, cell, execute, file_component, Job};

/// Options of one chat history fetch.
#[derive(Debug, Clone)]
pub struct MessageQuery {
    pub chat_id: String,
    pub viewer_id: Option<String>,
    pub direction: Direction,
    pub from_message_id: Option<String>,
    pub max_messages: usize,
}

/// Request budget for a message cap: one request per page, at least one.
pub fn message_budget(max_messages: usize, page_size: usize) -> usize {
    (max_messages / page_size.max(1)).max(1)
}

/// The paginated job for one chat's history.
pub fn message_job<'a>(
    registry: &'a Registry,
    config: &LinkConfig,
    query: &MessageQuery,
) -> Result<Job<'a>> {
    let page_size = config.pagination.message_page_size;
    let options = PaginationOptions::new(Paging::messages(query.direction))
        .with_max_iterations(message_budget(query.max_messages, page_size))
        .with_throttle(config.pagination.throttle());

    let mut initial = FetchRequest::new(query.chat_id.clone(), page_size);
    if let Some(viewer) = &query.viewer_id {
        initial = initial.with_param("viewerId", viewer.clone());
    }
    if let Some(from) = &query.from_message_id {
        initial = initial.with_cursor(from.clone());
    }

    let mut path_params = Params::new();
    path_params.insert("chatId".into(), query.chat_id.clone());

    Ok(Job {
        key: format!("messages-{}", query.chat_id),
        spec: registry.get(CHAT_MESSAGES)?,
        path_params,
        paginator: Paginator::new(options),
        initial,
        identify: IdentifierSpec::messages(),
    })
}

/// `createdAt` for a message: `createdAtMs` rendered, else the raw field.
pub fn message_created_at(record: &Record) -> String {
    match record.get("createdAtMs").and_then(Value::as_i64) {
        Some(ms) => format_timestamp_ms(ms),
        None => cell(record.get("createdAt")),
    }
}

/// Flat rows: id, authorId, text, createdAt.
pub fn message_rows(records: &[Record]) -> ArchiveContent {
    let rows = records
        .iter()
        .map(|r| {
            vec![
                cell(r.get("id")),
                sender_id(r).unwrap_or_default(),
                cell(r.get("text")),
                message_created_at(r),
            ]
        })
        .collect();
    ArchiveContent::Csv {
        headers: ["id", "authorId", "text", "createdAt"]
            .iter()
            .map(|h| h.to_string())
            .collect(),
        rows,
    }
}

pub fn cmd_messages<C, S>(
    client: &C,
    store: &S,
    writer: &ArchiveWriter,
    registry: &Registry,
    config: &LinkConfig,
    query: &MessageQuery,
    resume: ResumeArgs,
) -> Result<()>
where
    C: ApiClient + ?Sized,
    S: CheckpointStore,
{
    let job = message_job(registry, config, query)?;
    info!(
        chat_id = %query.chat_id,
        direction = %query.direction,
        budget = job.paginator.options().max_iterations,
        "Fetching chat messages"
    );

    let run = execute(client, store, &job, resume)?;
    let now = archive_time();
    let prefix = format!("chat_{}", file_component(&query.chat_id));

    let document = archive_document(&query.chat_id, &job.spec.path, &run);
    archive(writer, "messages", &prefix, &ArchiveContent::Json(document), now)?;
    archive(
        writer,
        "messages",
        &format!("{}_messages", prefix),
        &message_rows(run.records()),
        now,
    )?;
    Ok(())
}
