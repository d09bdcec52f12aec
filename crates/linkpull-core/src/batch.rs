use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::error::{ErrorKind, Result};
use crate::paginate::{FetchStatus, PageRun, PaginationState};
use crate::types::{Identifier, Record};

/// Default number of top-level resources between checkpoint saves.
pub const DEFAULT_CHECKPOINT_EVERY: usize = 10;

/// A top-level resource that did not finish cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFailure {
    pub resource: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Count of incomplete resources per error kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorHistogram {
    counts: BTreeMap<ErrorKind, usize>,
}

impl ErrorHistogram {
    pub fn record(&mut self, kind: ErrorKind) {
        *self.counts.entry(kind).or_default() += 1;
    }

    pub fn get(&self, kind: ErrorKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ErrorKind, usize)> + '_ {
        self.counts.iter().map(|(k, v)| (*k, *v))
    }
}

impl<'a> FromIterator<&'a ResourceFailure> for ErrorHistogram {
    fn from_iter<T: IntoIterator<Item = &'a ResourceFailure>>(iter: T) -> Self {
        let mut histogram = ErrorHistogram::default();
        for failure in iter {
            histogram.record(failure.kind);
        }
        histogram
    }
}

/// Outcome of a whole batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub total: usize,
    /// Resources handled by this run.
    pub processed: usize,
    /// Resources skipped because a checkpoint covered them.
    pub skipped: usize,
    /// Records from every resource, deduplicated across resources.
    pub state: PaginationState,
    pub failures: Vec<ResourceFailure>,
    pub histogram: ErrorHistogram,
    pub checkpoint_saves: usize,
}

impl BatchReport {
    pub fn records(&self) -> &[Record] {
        &self.state.accumulated
    }

    /// Resources whose records were cut short by the request budget.
    pub fn truncated(&self) -> impl Iterator<Item = &str> {
        self.failures
            .iter()
            .filter(|f| f.kind == ErrorKind::BudgetExhausted)
            .map(|f| f.resource.as_str())
    }
}

/// Runs a fetch over an ordered list of independent resources, isolating
/// per-resource failures and checkpointing progress.
pub struct BatchRunner<S> {
    store: S,
    key: String,
    checkpoint_every: usize,
}

impl<S: CheckpointStore> BatchRunner<S> {
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
        }
    }

    pub fn with_checkpoint_every(mut self, every: usize) -> Self {
        self.checkpoint_every = every.max(1);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn load_checkpoint(&self) -> Result<Option<Checkpoint>> {
        self.store.load(&self.key)
    }

    pub fn discard_checkpoint(&self) -> Result<()> {
        self.store.delete(&self.key)
    }

    /// Fetch every resource in order. `resume` skips the resources a checkpoint
    /// already covered and seeds the accumulated records.
    ///
    /// Returns an error only when the checkpoint store fails; the last saved
    /// checkpoint is then left in place.
    pub fn run<I, F>(
        &self,
        resources: &[String],
        resume: Option<Checkpoint>,
        identify: I,
        mut fetch: F,
    ) -> Result<BatchReport>
    where
        I: Fn(&Record) -> Option<Identifier>,
        F: FnMut(&str) -> PageRun,
    {
        let total = resources.len();
        let (start, mut state, mut failures) = match resume {
            Some(checkpoint) => {
                let skip = checkpoint.processed_count.min(total);
                info!(
                    key = %self.key,
                    skip,
                    total,
                    records = checkpoint.snapshot.accumulated.len(),
                    "Resuming batch from checkpoint"
                );
                (skip, checkpoint.snapshot, checkpoint.failures)
            }
            None => (0, PaginationState::default(), Vec::new()),
        };

        info!(key = %self.key, total, start, every = self.checkpoint_every, "Starting batch");

        let mut saves = 0usize;
        for (index, resource) in resources.iter().enumerate().skip(start) {
            let run = fetch(resource.as_str());
            let failed = matches!(run.status, FetchStatus::Failed(_));

            if let Some(failure) = describe_failure(resource, &run.status) {
                if failed {
                    error!(resource = %resource, kind = %failure.kind, error = %failure.message, "Resource failed, continuing with next");
                } else {
                    warn!(resource = %resource, kind = %failure.kind, "Resource incomplete");
                }
                failures.push(failure);
            }

            state.request_count += run.state.request_count;
            let absorbed = state.absorb(run.state.accumulated, &identify);
            let processed = index + 1;
            info!(
                resource = %resource,
                progress = %format!("{processed}/{total}"),
                new = absorbed.new,
                total_records = state.accumulated.len(),
                "Resource done"
            );

            if failed || processed % self.checkpoint_every == 0 {
                let checkpoint =
                    Checkpoint::new(processed, total, state.clone()).with_failures(failures.clone());
                self.store.save(&self.key, &checkpoint)?;
                saves += 1;
                info!(key = %self.key, processed, total, "Saved checkpoint");
            }
        }

        self.store.delete(&self.key)?;
        info!(key = %self.key, records = state.accumulated.len(), failures = failures.len(), "Batch complete");

        let histogram = failures.iter().collect();
        Ok(BatchReport {
            total,
            processed: total - start,
            skipped: start,
            state,
            failures,
            histogram,
            checkpoint_saves: saves,
        })
    }
}

fn describe_failure(resource: &str, status: &FetchStatus) -> Option<ResourceFailure> {
    let kind = status.error_kind()?;
    let message = match status {
        FetchStatus::Failed(err) => err.to_string(),
        _ => kind.description().to_string(),
    };
    Some(ResourceFailure {
        resource: resource.to_string(),
        kind,
        message,
    })
}
