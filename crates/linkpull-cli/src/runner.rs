//! Shared plumbing for commands that paginate one endpoint: checkpoint
//! resolution, running the paginator, settling the checkpoint and archiving.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, Utc};
use colored::Colorize;
use dialoguer::Confirm;
use serde_json::{json, Value};
use tracing::{info, warn};

use linkpull_core::paginate::PartialFetch;
use linkpull_core::{
    Checkpoint, CheckpointStore, EndpointSpec, FetchRequest, FetchStatus, IdentifierSpec, PageRun,
    Paginator, Record,
};
use linkpull_http::{ApiClient, EndpointSource, Params};
use linkpull_state::{ArchiveContent, ArchiveWriter, SaveDecision};

use crate::cli::ResumeArgs;

/// One paginated fetch of one endpoint.
pub struct Job<'a> {
    /// Checkpoint key.
    pub key: String,
    pub spec: &'a EndpointSpec,
    pub path_params: Params,
    pub paginator: Paginator,
    pub initial: FetchRequest,
    pub identify: IdentifierSpec,
}

impl Job<'_> {
    /// Run from scratch, or from the snapshot of `resume`.
    pub fn run<C: ApiClient + ?Sized>(&self, client: &C, resume: Option<Checkpoint>) -> PageRun {
        let mut source =
            EndpointSource::new(client, self.spec).with_path_params(self.path_params.clone());
        let identify = |record: &Record| self.identify.extract(record);
        let run = match resume {
            Some(checkpoint) => {
                self.paginator
                    .resume(&self.initial, checkpoint.snapshot, &mut source, identify)
            }
            None => self.paginator.fetch_all(&self.initial, &mut source, identify),
        };
        if source.used_fallback() {
            info!(endpoint = %self.spec.name, path = %source.active_path(), "Served by fallback path");
        }
        run
    }
}

/// Decide whether to continue from an existing checkpoint. Without
/// `--resume` or `--fresh` the operator is asked.
pub fn resolve_resume<S: CheckpointStore>(
    store: &S,
    key: &str,
    args: ResumeArgs,
) -> Result<Option<Checkpoint>> {
    let Some(checkpoint) = store.load(key)? else {
        return Ok(None);
    };

    let resume = if args.resume {
        true
    } else if args.fresh {
        false
    } else {
        Confirm::new()
            .with_prompt(format!(
                "Found checkpoint '{}' ({}/{} done, {} records, saved {}). Resume?",
                key,
                checkpoint.processed_count,
                checkpoint.total_count,
                checkpoint.snapshot.accumulated.len(),
                checkpoint.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
            ))
            .default(true)
            .interact()?
    };

    if resume {
        info!(key, processed = checkpoint.processed_count, "Resuming from checkpoint");
        Ok(Some(checkpoint))
    } else {
        info!(key, "Discarding checkpoint");
        store.delete(key)?;
        Ok(None)
    }
}

/// Persist or clear the checkpoint of a single-resource run.
///
/// Complete runs delete it. Truncated and failed runs save their state so
/// the next run continues. A stalled cursor cannot advance on resume either,
/// so its checkpoint is cleared.
pub fn settle<S: CheckpointStore>(store: &S, key: &str, run: &PageRun) -> Result<()> {
    match &run.status {
        FetchStatus::Complete(_) | FetchStatus::SingleShot | FetchStatus::Stalled => {
            store.delete(key)?;
        }
        FetchStatus::Truncated | FetchStatus::Failed(_) => {
            let checkpoint = Checkpoint::new(0, 1, run.state.clone());
            store.save(key, &checkpoint)?;
            info!(key, records = run.records().len(), "Saved checkpoint");
        }
    }
    Ok(())
}

/// Resolve the checkpoint, run the job, settle the checkpoint and report.
/// A failed run comes back as an error carrying its partial records.
pub fn execute<C, S>(client: &C, store: &S, job: &Job, args: ResumeArgs) -> Result<PageRun>
where
    C: ApiClient + ?Sized,
    S: CheckpointStore,
{
    let resume = resolve_resume(store, &job.key, args)?;
    let run = job.run(client, resume);
    settle(store, &job.key, &run)?;
    print_outcome(&job.initial.resource_id, &run);

    if let FetchStatus::Failed(error) = &run.status {
        let error = error.clone();
        let partial = PartialFetch {
            error,
            records: run.into_records(),
        };
        return Err(anyhow::Error::new(partial)
            .context(format!("Fetching '{}' failed, checkpoint '{}' kept", job.spec.name, job.key)));
    }
    Ok(run)
}

/// CSV cell for a JSON value: strings verbatim, null empty, the rest as JSON.
pub fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// CSV cell for a nested field, e.g. `["chatMemberProfile", "email"]`.
pub fn cell_at(record: &Record, path: &[&str]) -> String {
    let mut current = None;
    for (i, key) in path.iter().enumerate() {
        current = if i == 0 {
            record.get(*key)
        } else {
            current.and_then(|v: &Value| v.get(*key))
        };
    }
    cell(current)
}

/// JSON document written for one fetched resource.
pub fn archive_document(resource: &str, endpoint: &str, run: &PageRun) -> Value {
    json!({
        "resource": resource,
        "endpoint": endpoint,
        "status": run.status.label(),
        "truncated": !run.is_complete(),
        "request_count": run.state.request_count,
        "fetched_at": Utc::now().to_rfc3339(),
        "count": run.records().len(),
        "items": run.records(),
    })
}

/// Write a timestamped archive and report what happened.
pub fn archive(
    writer: &ArchiveWriter,
    dir: &str,
    prefix: &str,
    content: &ArchiveContent,
    now: NaiveDateTime,
) -> Result<SaveDecision> {
    let decision = writer
        .write_timestamped(dir, prefix, content, now)
        .with_context(|| format!("Failed to write archive {}/{}", dir, prefix))?;
    match &decision {
        SaveDecision::Write(path) => println!("{} {}", "Saved".green(), path.display()),
        SaveDecision::SkipNewer(path) => {
            warn!(path = %path.display(), "Newer archive already present");
            println!("{} newer archive exists: {}", "Skipped".yellow(), path.display());
        }
    }
    Ok(decision)
}

/// Local wall-clock time for archive names.
pub fn archive_time() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Identifier made safe for use in a file name.
pub fn file_component(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Print the closing line for a single-resource run.
pub fn print_outcome(label: &str, run: &PageRun) {
    let count = run.records().len();
    match &run.status {
        FetchStatus::Complete(_) | FetchStatus::SingleShot => {
            println!("{} {}: {} records in {} requests", "Done".green().bold(), label, count, run.requests);
        }
        FetchStatus::Truncated => {
            println!(
                "{} {}: {} records, request budget reached (checkpoint kept, rerun with --resume)",
                "Truncated".yellow().bold(),
                label,
                count
            );
        }
        FetchStatus::Stalled => {
            println!(
                "{} {}: {} records, cursor could not advance",
                "Stalled".yellow().bold(),
                label,
                count
            );
        }
        FetchStatus::Failed(err) => {
            println!("{} {}: {} ({})", "Failed".red().bold(), label, err, err.kind().description());
        }
    }
}
