use anyhow::Result;
use chrono::{Days, NaiveDateTime};
use tracing::info;

use linkpull_config::LinkConfig;
use linkpull_core::registry::ENDLESS_ACTIVITIES;
use linkpull_core::report::activity_duration;
use linkpull_core::{
    CheckpointStore, FetchRequest, IdentifierSpec, PaginationOptions, Paginator, Paging, Record,
    Registry,
};
use linkpull_http::{ApiClient, Params};
use linkpull_state::{ArchiveContent, ArchiveWriter};
use serde_json::Value;

use crate::cli::ResumeArgs;
use crate::runner::{archive, archive_document, archive_time, cell, cell_at, execute, Job};

/// Time window sent as `from`/`to`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityWindow {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl ActivityWindow {
    /// From the command line: explicit bounds, or the last `days` days before `now`.
    pub fn new(from: Option<String>, to: Option<String>, last_days: Option<u32>, now: NaiveDateTime) -> Self {
        match last_days {
            Some(days) => {
                let start = now
                    .checked_sub_days(Days::new(u64::from(days)))
                    .unwrap_or(NaiveDateTime::MIN);
                Self {
                    from: Some(bound(start)),
                    to: None,
                }
            }
            None => Self {
                from: from.map(normalize_bound),
                to: to.map(normalize_bound),
            },
        }
    }
}

/// The API expects `YYYY-MM-DD+HH:MM:SS`.
fn bound(at: NaiveDateTime) -> String {
    at.format("%Y-%m-%d+00:00:00").to_string()
}

/// A bare date gets midnight appended.
fn normalize_bound(raw: String) -> String {
    if raw.len() == 10 && !raw.contains('+') {
        format!("{}+00:00:00", raw)
    } else {
        raw
    }
}

/// Checkpoint key for one window. A saved page cursor is only valid for the
/// same bounds and page size, so those are part of the key.
pub fn activity_key(window: &ActivityWindow, page_size: usize) -> String {
    format!(
        "endless-activities-{}-{}-p{}",
        window.from.as_deref().unwrap_or("start"),
        window.to.as_deref().unwrap_or("now"),
        page_size
    )
}

pub fn activity_job<'a>(
    registry: &'a Registry,
    config: &LinkConfig,
    window: &ActivityWindow,
    max_pages: usize,
) -> Result<Job<'a>> {
    let options = PaginationOptions::new(Paging::pages())
        .with_page_size_param("perPage")
        .with_max_iterations(max_pages.max(1))
        .with_throttle(config.pagination.throttle());

    let mut initial = FetchRequest::new("endless-activities", config.pagination.page_size);
    if let Some(from) = &window.from {
        initial = initial.with_param("from", from.clone());
    }
    if let Some(to) = &window.to {
        initial = initial.with_param("to", to.clone());
    }

    Ok(Job {
        key: activity_key(window, config.pagination.page_size),
        spec: registry.get(ENDLESS_ACTIVITIES)?,
        path_params: Params::new(),
        paginator: Paginator::new(options),
        initial,
        identify: IdentifierSpec::activities(),
    })
}

fn first_cell(record: &Record, keys: &[&str]) -> String {
    keys.iter()
        .map(|k| cell(record.get(*k)))
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}

/// One row per activity with its computed duration.
pub fn activity_rows(records: &[Record]) -> ArchiveContent {
    let identify = IdentifierSpec::activities();
    let headers = [
        "activity_id",
        "event_session_id",
        "endless_event_id",
        "user_id",
        "activity_type",
        "status",
        "start_time",
        "end_time",
        "duration_minutes",
        "participants_count",
        "room_name",
    ];

    let rows = records
        .iter()
        .map(|r| {
            let participants = match r.get("participants").and_then(Value::as_array) {
                Some(list) => list.len().to_string(),
                None => cell(r.get("participantsCount")),
            };
            let user_id = match cell_at(r, &["eventSession", "createdBy", "id"]) {
                id if id.is_empty() => cell(r.get("userId")),
                id => id,
            };
            let room = match cell_at(r, &["eventSession", "name"]) {
                name if name.is_empty() => first_cell(r, &["roomName", "name"]),
                name => name,
            };
            vec![
                identify.extract(r).map(|id| id.to_string()).unwrap_or_default(),
                cell(r.get("eventSessionId")),
                cell_at(r, &["eventSession", "id"]),
                user_id,
                first_cell(r, &["type", "activityType"]),
                cell(r.get("status")),
                first_cell(r, &["startTime", "startedAt", "createdAt"]),
                first_cell(r, &["endTime", "finishedAt", "endedAt"]),
                activity_duration(r).to_string(),
                participants,
                room,
            ]
        })
        .collect();

    ArchiveContent::Csv {
        headers: headers.iter().map(|h| h.to_string()).collect(),
        rows,
    }
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_activities<C, S>(
    client: &C,
    store: &S,
    writer: &ArchiveWriter,
    registry: &Registry,
    config: &LinkConfig,
    window: &ActivityWindow,
    max_pages: usize,
    resume: ResumeArgs,
) -> Result<()>
where
    C: ApiClient + ?Sized,
    S: CheckpointStore,
{
    info!(from = ?window.from, to = ?window.to, max_pages, "Fetching endless activities");
    let job = activity_job(registry, config, window, max_pages)?;
    let run = execute(client, store, &job, resume)?;
    let now = archive_time();

    let document = archive_document("endless", &job.spec.path, &run);
    archive(writer, "activities", "endless_activities", &ArchiveContent::Json(document), now)?;
    archive(writer, "activities", "endless_activities_flat", &activity_rows(run.records()), now)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use linkpull_http::MockClient;
    use serde_json::json;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 10)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_window() {
        let window = ActivityWindow::new(None, None, Some(7), now());
        assert_eq!(window.from.as_deref(), Some("2024-05-03+00:00:00"));
        assert!(window.to.is_none());

        let window = ActivityWindow::new(
            Some("2024-01-01".into()),
            Some("2024-02-01+12:00:00".into()),
            None,
            now(),
        );
        assert_eq!(window.from.as_deref(), Some("2024-01-01+00:00:00"));
        assert_eq!(window.to.as_deref(), Some("2024-02-01+12:00:00"));
    }

    #[test]
    fn test_window_with_huge_last_days_does_not_panic() {
        let window = ActivityWindow::new(None, None, Some(u32::MAX), now());
        let from = window.from.unwrap();
        assert!(from.ends_with("+00:00:00"));
        assert_ne!(from, "2024-05-10+00:00:00");
    }

    #[test]
    fn test_checkpoint_key_follows_window() {
        let registry = Registry::builtin();
        let config = LinkConfig::parse("[pagination]\nthrottle_ms = 0\npage_size = 50\n").unwrap();
        let may = ActivityWindow::new(Some("2024-05-01".into()), None, None, now());
        let april = ActivityWindow::new(Some("2024-04-01".into()), Some("2024-04-30".into()), None, now());

        let may_key = activity_job(&registry, &config, &may, 5).unwrap().key;
        let april_key = activity_job(&registry, &config, &april, 5).unwrap().key;
        assert_eq!(may_key, "endless-activities-2024-05-01+00:00:00-now-p50");
        assert_ne!(may_key, april_key);
    }

    #[test]
    fn test_resume_ignores_checkpoint_of_other_window() {
        use linkpull_core::{Checkpoint, MemoryCheckpointStore, PaginationState};

        let registry = Registry::builtin();
        let config = LinkConfig::parse("[pagination]\nthrottle_ms = 0\npage_size = 2\n").unwrap();
        let store = MemoryCheckpointStore::new();
        let old = ActivityWindow::new(Some("2024-04-01".into()), None, None, now());
        let mut stale = PaginationState::default();
        stale.accumulated.push(json!({"id": "old"}).as_object().unwrap().clone());
        store
            .save(&activity_key(&old, 2), &Checkpoint::new(0, 1, stale))
            .unwrap();

        let client = MockClient::new();
        client.respond(
            "/eventsessions/endless/activities",
            json!({"data": {"activities": [{"id": "new"}]}}),
        );
        let dir = tempfile::TempDir::new().unwrap();
        let writer = ArchiveWriter::new(dir.path());
        let window = ActivityWindow::new(Some("2024-05-01".into()), None, None, now());
        let resume = ResumeArgs { resume: true, fresh: false };

        cmd_activities(&client, &store, &writer, &registry, &config, &window, 5, resume).unwrap();

        assert!(store.load(&activity_key(&old, 2)).unwrap().is_some());
        assert_eq!(client.requests()[0].query.get("page").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_activities_use_composite_identity() {
        let registry = Registry::builtin();
        let config = LinkConfig::parse("[pagination]\nthrottle_ms = 0\npage_size = 3\n").unwrap();
        let client = MockClient::new();
        client.respond(
            "/eventsessions/endless/activities",
            json!({"data": {"activities": [
                {"eventSessionId": "e1", "userId": "u1", "startTime": "2024-05-01T10:00:00Z"},
                {"eventSessionId": "e1", "userId": "u1", "startTime": "2024-05-01T10:00:00Z"},
                {"userId": "u2"}
            ]}}),
        );

        let window = ActivityWindow::new(Some("2024-05-01".into()), None, None, now());
        let job = activity_job(&registry, &config, &window, 5).unwrap();
        let run = job.run(&client, None);

        // one duplicate, one without anything to identify it
        assert_eq!(run.records().len(), 1);
        let request = &client.requests()[0];
        assert_eq!(request.query.get("from").map(String::as_str), Some("2024-05-01+00:00:00"));
        assert_eq!(request.query.get("perPage").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_activity_rows() {
        let record = json!({
            "id": "a1",
            "eventSessionId": "e1",
            "eventSession": {"id": "room", "name": "Daily", "createdBy": {"id": "owner"}},
            "startTime": "2024-05-01T10:00:00Z",
            "finishedAt": "2024-05-01T10:45:00Z",
            "participants": [{}, {}]
        })
        .as_object()
        .unwrap()
        .clone();

        let ArchiveContent::Csv { rows, .. } = activity_rows(&[record]) else {
            panic!("expected csv");
        };
        assert_eq!(
            rows[0],
            vec![
                "a1", "e1", "room", "owner", "", "", "2024-05-01T10:00:00Z",
                "2024-05-01T10:45:00Z", "45", "2", "Daily"
            ]
        );
    }
}
