use std::cell::Cell;
use std::time::Duration;

use linkpull_core::{
    BatchRunner, Checkpoint, CheckpointStore, Error, ErrorKind, FetchError, FetchRequest,
    FetchResult, IdentifierSpec, MemoryCheckpointStore, PageRun, PaginationOptions, Paginator,
    Paging, Record, Result,
};
use serde_json::json;

/// Each resource owns `per_resource` items; neighbouring resources share one item.
fn fetch_resource(resource: &str, per_resource: usize) -> PageRun {
    let n: usize = resource.trim_start_matches("chat-").parse().unwrap();
    let items: Vec<Record> = (0..=per_resource)
        .map(|i| {
            json!({ "id": format!("{}", n * per_resource + i) })
                .as_object()
                .unwrap()
                .clone()
        })
        .collect();

    let paginator = Paginator::new(
        PaginationOptions::new(Paging::pages()).with_throttle(Duration::ZERO),
    );
    let mut served = false;
    let mut source = |_: &FetchRequest| -> std::result::Result<Option<FetchResult>, FetchError> {
        if served {
            return Ok(None);
        }
        served = true;
        Ok(Some(FetchResult::direct(items.clone())))
    };
    let spec = IdentifierSpec::messages();
    paginator.fetch_all(
        &FetchRequest::new(resource, 100),
        &mut source,
        |r: &Record| spec.extract(r),
    )
}

fn resources(count: usize) -> Vec<String> {
    (1..=count).map(|n| format!("chat-{n}")).collect()
}

/// Wraps a store and fails every save after the first `allowed`.
struct CrashingStore<'a> {
    inner: &'a MemoryCheckpointStore,
    allowed: usize,
    seen: Cell<usize>,
}

impl CheckpointStore for CrashingStore<'_> {
    fn save(&self, key: &str, checkpoint: &Checkpoint) -> Result<()> {
        self.seen.set(self.seen.get() + 1);
        if self.seen.get() > self.allowed {
            return Err(Error::Store("disk full".into()));
        }
        self.inner.save(key, checkpoint)
    }

    fn load(&self, key: &str) -> Result<Option<Checkpoint>> {
        self.inner.load(key)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key)
    }

    fn list(&self) -> Result<Vec<(String, Checkpoint)>> {
        self.inner.list()
    }
}

#[test]
fn test_checkpoint_cadence() {
    let store = MemoryCheckpointStore::new();
    let runner = BatchRunner::new(&store, "chats").with_checkpoint_every(10);
    let spec = IdentifierSpec::messages();

    let report = runner
        .run(&resources(25), None, |r: &Record| spec.extract(r), |resource| {
            fetch_resource(resource, 4)
        })
        .unwrap();

    assert_eq!(store.saves(), 2);
    assert_eq!(store.deletes(), 1);
    assert_eq!(report.checkpoint_saves, 2);
    assert!(store.load("chats").unwrap().is_none());
    assert!(report.failures.is_empty());
}

#[test]
fn test_resume_skips_processed_resources_and_converges() {
    let spec = IdentifierSpec::messages();
    let identify = |r: &Record| spec.extract(r);

    let scratch_store = MemoryCheckpointStore::new();
    let scratch = BatchRunner::new(&scratch_store, "chats")
        .run(&resources(25), None, identify, |resource| fetch_resource(resource, 4))
        .unwrap();

    // interrupted run: the second checkpoint write fails
    let memory = MemoryCheckpointStore::new();
    let crashing = CrashingStore {
        inner: &memory,
        allowed: 1,
        seen: Cell::new(0),
    };
    let interrupted = BatchRunner::new(&crashing, "chats").run(
        &resources(25),
        None,
        identify,
        |resource| fetch_resource(resource, 4),
    );
    assert!(matches!(interrupted, Err(Error::Store(_))));

    let checkpoint = memory.load("chats").unwrap().unwrap();
    assert_eq!(checkpoint.processed_count, 10);
    assert_eq!(checkpoint.total_count, 25);
    let saved_records = checkpoint.snapshot.accumulated.len();

    let mut fetched = Vec::new();
    let resumed = BatchRunner::new(&memory, "chats")
        .run(&resources(25), Some(checkpoint), identify, |resource| {
            fetched.push(resource.to_string());
            fetch_resource(resource, 4)
        })
        .unwrap();

    assert_eq!(fetched.first().map(String::as_str), Some("chat-11"));
    assert_eq!(fetched.len(), 15);
    assert_eq!(resumed.skipped, 10);
    assert!(resumed.records().len() >= saved_records);
    assert_eq!(resumed.records().len(), scratch.records().len());
    assert!(memory.load("chats").unwrap().is_none());
}

#[test]
fn test_failed_resources_survive_resume_in_histogram() {
    let spec = IdentifierSpec::messages();
    let identify = |r: &Record| spec.extract(r);

    let failing = |resource: &str| -> PageRun {
        if resource == "chat-2" {
            let mut source =
                |_: &FetchRequest| -> std::result::Result<Option<FetchResult>, FetchError> {
                    Err(FetchError::from_status(404, "/chats/channel/2/messages", "not found"))
                };
            Paginator::new(PaginationOptions::new(Paging::pages()).with_throttle(Duration::ZERO))
                .fetch_all(&FetchRequest::new(resource, 100), &mut source, |r: &Record| {
                    spec.extract(r)
                })
        } else {
            fetch_resource(resource, 2)
        }
    };

    // the failure boundary save succeeds, the cadence save after it does not
    let memory = MemoryCheckpointStore::new();
    let crashing = CrashingStore {
        inner: &memory,
        allowed: 1,
        seen: Cell::new(0),
    };
    let interrupted = BatchRunner::new(&crashing, "chats")
        .with_checkpoint_every(3)
        .run(&resources(5), None, identify, failing);
    assert!(matches!(interrupted, Err(Error::Store(_))));

    let checkpoint = memory.load("chats").unwrap().unwrap();
    assert_eq!(checkpoint.processed_count, 2);
    assert_eq!(checkpoint.failures.len(), 1);

    let mut fetched = Vec::new();
    let report = BatchRunner::new(&memory, "chats")
        .with_checkpoint_every(3)
        .run(&resources(5), Some(checkpoint), identify, |resource| {
            fetched.push(resource.to_string());
            fetch_resource(resource, 2)
        })
        .unwrap();

    assert_eq!(fetched, vec!["chat-3", "chat-4", "chat-5"]);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.histogram.get(ErrorKind::NotFound), 1);
    assert_eq!(report.failures[0].resource, "chat-2");
    assert!(memory.load("chats").unwrap().is_none());
}
