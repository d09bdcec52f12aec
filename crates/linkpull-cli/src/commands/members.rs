use anyhow::Result;

use linkpull_config::LinkConfig;
use linkpull_core::registry::ORGANIZATION_MEMBERS;
use linkpull_core::{
    CheckpointStore, FetchRequest, IdentifierSpec, PaginationOptions, Paginator, Paging, Record,
    Registry,
};
use linkpull_http::{ApiClient, Params};
use linkpull_state::{ArchiveContent, ArchiveWriter};

use crate::cli::ResumeArgs;
use crate::runner::{archive, archive_document, archive_time, cell_at, execute, Job};

const MEMBER_COLUMNS: [(&str, &[&str]); 11] = [
    ("chatUserId", &["chatUserId"]),
    ("organizationId", &["organizationId"]),
    ("role", &["role"]),
    ("status", &["status"]),
    ("firstName", &["chatMemberProfile", "firstName"]),
    ("lastName", &["chatMemberProfile", "lastName"]),
    ("displayName", &["chatMemberProfile", "displayName"]),
    ("email", &["chatMemberProfile", "email"]),
    ("phone", &["chatMemberProfile", "phone"]),
    ("position", &["chatMemberProfile", "position"]),
    ("department", &["chatMemberProfile", "department"]),
];

/// A saved page cursor is only valid for the page size it was taken with.
pub fn member_key(page_size: usize) -> String {
    format!("organization-members-p{}", page_size)
}

pub fn member_job<'a>(registry: &'a Registry, config: &LinkConfig, max_pages: usize) -> Result<Job<'a>> {
    let options = PaginationOptions::new(Paging::pages())
        .with_page_size_param("perPage")
        .with_max_iterations(max_pages.max(1))
        .with_throttle(config.pagination.throttle());

    Ok(Job {
        key: member_key(config.pagination.page_size),
        spec: registry.get(ORGANIZATION_MEMBERS)?,
        path_params: Params::new(),
        paginator: Paginator::new(options),
        initial: FetchRequest::new("organization-members", config.pagination.page_size),
        identify: IdentifierSpec::members(),
    })
}

/// Members flattened with their chat profile.
pub fn member_rows(records: &[Record]) -> ArchiveContent {
    ArchiveContent::Csv {
        headers: MEMBER_COLUMNS.iter().map(|(h, _)| h.to_string()).collect(),
        rows: records
            .iter()
            .map(|r| MEMBER_COLUMNS.iter().map(|(_, path)| cell_at(r, path)).collect())
            .collect(),
    }
}

pub fn cmd_members<C, S>(
    client: &C,
    store: &S,
    writer: &ArchiveWriter,
    registry: &Registry,
    config: &LinkConfig,
    max_pages: usize,
    resume: ResumeArgs,
) -> Result<()>
where
    C: ApiClient + ?Sized,
    S: CheckpointStore,
{
    let job = member_job(registry, config, max_pages)?;
    let run = execute(client, store, &job, resume)?;
    let now = archive_time();

    let document = archive_document("organization", &job.spec.path, &run);
    archive(writer, "members", "organization_members", &ArchiveContent::Json(document), now)?;
    archive(writer, "members", "organization_members_flat", &member_rows(run.records()), now)?;
    Ok(())
}
