use anyhow::Result;

use linkpull_config::LinkConfig;
use linkpull_core::registry::CHANNEL_USERS;
use linkpull_core::{
    CheckpointStore, FetchRequest, IdentifierSpec, PaginationOptions, Paginator, Paging, Record,
    Registry,
};
use linkpull_http::{ApiClient, Params};
use linkpull_state::{ArchiveContent, ArchiveWriter};

use crate::cli::ResumeArgs;
use crate::runner::{archive, archive_document, archive_time, cell_at, execute, file_component, Job};

const USER_COLUMNS: [(&str, &[&str]); 6] = [
    ("id", &["id"]),
    ("chatUserId", &["chatUserId"]),
    ("role", &["role"]),
    ("firstName", &["chatMemberProfile", "firstName"]),
    ("lastName", &["chatMemberProfile", "lastName"]),
    ("email", &["chatMemberProfile", "email"]),
];

pub fn channel_users_key(chat_id: &str, page_size: usize) -> String {
    format!("channel-users-{}-p{}", chat_id, page_size)
}

/// Channel users are paged by item offset.
pub fn channel_users_job<'a>(
    registry: &'a Registry,
    config: &LinkConfig,
    chat_id: &str,
    max_pages: usize,
) -> Result<Job<'a>> {
    let page_size = config.pagination.page_size;
    let options = PaginationOptions::new(Paging::offset())
        .with_max_iterations(max_pages.max(1))
        .with_throttle(config.pagination.throttle());

    let mut path_params = Params::new();
    path_params.insert("chatId".into(), chat_id.to_string());

    Ok(Job {
        key: channel_users_key(chat_id, page_size),
        spec: registry.get(CHANNEL_USERS)?,
        path_params,
        paginator: Paginator::new(options),
        initial: FetchRequest::new(chat_id, page_size),
        identify: IdentifierSpec::members(),
    })
}

pub fn channel_user_rows(records: &[Record]) -> ArchiveContent {
    ArchiveContent::Csv {
        headers: USER_COLUMNS.iter().map(|(h, _)| h.to_string()).collect(),
        rows: records
            .iter()
            .map(|r| USER_COLUMNS.iter().map(|(_, path)| cell_at(r, path)).collect())
            .collect(),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_channel_users<C, S>(
    client: &C,
    store: &S,
    writer: &ArchiveWriter,
    registry: &Registry,
    config: &LinkConfig,
    chat_id: &str,
    max_pages: usize,
    resume: ResumeArgs,
) -> Result<()>
where
    C: ApiClient + ?Sized,
    S: CheckpointStore,
{
    let job = channel_users_job(registry, config, chat_id, max_pages)?;
    let run = execute(client, store, &job, resume)?;
    let now = archive_time();

    let name = format!("chat_{}_users", file_component(chat_id));
    let document = archive_document(chat_id, &job.spec.path, &run);
    archive(writer, "channel_users", &name, &ArchiveContent::Json(document), now)?;
    archive(writer, "channel_users", &format!("{name}_flat"), &channel_user_rows(run.records()), now)?;
    Ok(())
}
