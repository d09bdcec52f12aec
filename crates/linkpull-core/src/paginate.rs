use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dedup::SeenIds;
use crate::error::{ErrorKind, FetchError};
use crate::types::{CursorPosition, Direction, FetchRequest, FetchResult, Identifier, Record};

/// How consecutive pages are addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Paging {
    /// Cursor is the identifier of an item from the previous page.
    Cursor {
        cursor_param: String,
        direction: Direction,
        direction_param: Option<String>,
    },
    /// 1-based (or `first_page`-based) page counter.
    Page { page_param: String, first_page: u64 },
    /// Item offset, advanced by the page size.
    Offset { offset_param: String },
}

impl Paging {
    /// `fromMessageId` + `direction`, as used by chat message history.
    pub fn messages(direction: Direction) -> Self {
        Paging::Cursor {
            cursor_param: "fromMessageId".into(),
            direction,
            direction_param: Some("direction".into()),
        }
    }

    pub fn pages() -> Self {
        Paging::Page {
            page_param: "page".into(),
            first_page: 1,
        }
    }

    pub fn offset() -> Self {
        Paging::Offset {
            offset_param: "offset".into(),
        }
    }

    fn direction(&self) -> Direction {
        match self {
            Paging::Cursor { direction, .. } => *direction,
            _ => Direction::default(),
        }
    }

    fn initial_position(&self, request: &FetchRequest) -> Option<CursorPosition> {
        match self {
            Paging::Cursor { .. } => request
                .cursor
                .as_ref()
                .map(|c| CursorPosition::Id(Identifier::new(c.clone()))),
            Paging::Page { first_page, .. } => Some(CursorPosition::Page(*first_page)),
            Paging::Offset { .. } => Some(CursorPosition::Offset(0)),
        }
    }
}

/// Knobs for one fetch-all run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationOptions {
    pub paging: Paging,
    /// Query parameter carrying the page size (`limit`, `perPage`).
    pub page_size_param: String,
    /// Maximum number of requests before the run is reported as truncated.
    pub max_iterations: usize,
    /// Pause between consecutive page requests.
    pub throttle: Duration,
}

impl PaginationOptions {
    pub fn new(paging: Paging) -> Self {
        Self {
            paging,
            page_size_param: "limit".into(),
            max_iterations: 100,
            throttle: Duration::from_millis(100),
        }
    }

    pub fn with_page_size_param(mut self, param: impl Into<String>) -> Self {
        self.page_size_param = param.into();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }
}

/// Mutable progress of one fetch-all run. Serializable so it can be checkpointed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaginationState {
    pub seen_ids: SeenIds,
    pub accumulated: Vec<Record>,
    pub cursor: Option<CursorPosition>,
    pub request_count: usize,
    pub direction: Direction,
}

/// Counts from merging one page into the state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Absorbed {
    pub new: usize,
    pub duplicates: usize,
    pub unidentified: usize,
}

impl PaginationState {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            ..Self::default()
        }
    }

    /// Append the records whose identifier has not been seen yet.
    /// Records without an identifier are dropped.
    pub fn absorb<I>(&mut self, items: Vec<Record>, identify: &I) -> Absorbed
    where
        I: Fn(&Record) -> Option<Identifier>,
    {
        let mut absorbed = Absorbed::default();
        for item in items {
            match identify(&item) {
                Some(id) => {
                    if self.seen_ids.add_if_new(id) {
                        self.accumulated.push(item);
                        absorbed.new += 1;
                    } else {
                        absorbed.duplicates += 1;
                    }
                }
                None => absorbed.unidentified += 1,
            }
        }
        absorbed
    }
}

/// Why a run ended naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exhaustion {
    /// The source returned no data at all.
    NoData,
    /// The response unwrapped to zero items.
    EmptyPage,
    /// Every item on the page had been seen before.
    AllDuplicates,
    /// Fewer items than the requested page size.
    ShortPage,
}

/// How a run ended. Callers must treat each variant differently when archiving.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchStatus {
    Complete(Exhaustion),
    /// `Around` pagination stopped after its one page.
    SingleShot,
    /// `max_iterations` was reached before exhaustion.
    Truncated,
    /// The trailing item had no identifier to use as the next cursor.
    Stalled,
    Failed(FetchError),
}

impl FetchStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, FetchStatus::Complete(_) | FetchStatus::SingleShot)
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            FetchStatus::Complete(_) | FetchStatus::SingleShot => None,
            FetchStatus::Truncated => Some(ErrorKind::BudgetExhausted),
            FetchStatus::Stalled => Some(ErrorKind::StalledPagination),
            FetchStatus::Failed(err) => Some(err.kind()),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FetchStatus::Complete(_) => "complete",
            FetchStatus::SingleShot => "single_shot",
            FetchStatus::Truncated => "truncated",
            FetchStatus::Stalled => "stalled",
            FetchStatus::Failed(_) => "failed",
        }
    }
}

/// A failed run together with what was accumulated before the failure.
#[derive(Debug, Error)]
#[error("{error} ({} records accumulated before the failure)", .records.len())]
pub struct PartialFetch {
    pub error: FetchError,
    pub records: Vec<Record>,
}

/// Result of [`Paginator::fetch_all`].
#[derive(Debug, Clone)]
pub struct PageRun {
    pub state: PaginationState,
    pub status: FetchStatus,
    /// Requests issued by this run (excluding any before a resume).
    pub requests: usize,
}

impl PageRun {
    pub fn records(&self) -> &[Record] {
        &self.state.accumulated
    }

    pub fn into_records(self) -> Vec<Record> {
        self.state.accumulated
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }

    /// Turn a failed run into an error that still carries the partial records.
    pub fn into_result(self) -> Result<Vec<Record>, PartialFetch> {
        match self.status {
            FetchStatus::Failed(error) => Err(PartialFetch {
                error,
                records: self.state.accumulated,
            }),
            _ => Ok(self.state.accumulated),
        }
    }
}

/// Something that can return one page for a request.
pub trait PageSource {
    /// `Ok(None)` means the source had no data for this request.
    fn fetch_page(&mut self, request: &FetchRequest) -> Result<Option<FetchResult>, FetchError>;
}

impl<F> PageSource for F
where
    F: FnMut(&FetchRequest) -> Result<Option<FetchResult>, FetchError>,
{
    fn fetch_page(&mut self, request: &FetchRequest) -> Result<Option<FetchResult>, FetchError> {
        self(request)
    }
}

/// Drives a [`PageSource`] until the collection is exhausted, the budget runs
/// out, the cursor stalls, or a page fails.
#[derive(Debug, Clone)]
pub struct Paginator {
    options: PaginationOptions,
}

impl Paginator {
    pub fn new(options: PaginationOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PaginationOptions {
        &self.options
    }

    pub fn fetch_all<S, I>(&self, initial: &FetchRequest, source: &mut S, identify: I) -> PageRun
    where
        S: PageSource + ?Sized,
        I: Fn(&Record) -> Option<Identifier>,
    {
        let mut state = PaginationState::new(self.options.paging.direction());
        state.cursor = self.options.paging.initial_position(initial);
        self.run(initial, state, source, &identify)
    }

    /// Continue a run from a previously saved state.
    pub fn resume<S, I>(
        &self,
        initial: &FetchRequest,
        state: PaginationState,
        source: &mut S,
        identify: I,
    ) -> PageRun
    where
        S: PageSource + ?Sized,
        I: Fn(&Record) -> Option<Identifier>,
    {
        info!(
            resource = %initial.resource_id,
            accumulated = state.accumulated.len(),
            requests = state.request_count,
            "Resuming pagination"
        );
        self.run(initial, state, source, &identify)
    }

    fn run<S, I>(
        &self,
        initial: &FetchRequest,
        mut state: PaginationState,
        source: &mut S,
        identify: &I,
    ) -> PageRun
    where
        S: PageSource + ?Sized,
        I: Fn(&Record) -> Option<Identifier>,
    {
        let resource = initial.resource_id.as_str();
        let mut requests = 0usize;

        let status = loop {
            if requests >= self.options.max_iterations {
                warn!(
                    resource,
                    max_iterations = self.options.max_iterations,
                    accumulated = state.accumulated.len(),
                    "Request budget exhausted, results are truncated"
                );
                break FetchStatus::Truncated;
            }

            if requests > 0 && !self.options.throttle.is_zero() {
                thread::sleep(self.options.throttle);
            }

            let request = self.page_request(initial, state.cursor.as_ref());
            requests += 1;
            state.request_count += 1;

            let result = match source.fetch_page(&request) {
                Ok(Some(result)) => result,
                Ok(None) => break FetchStatus::Complete(Exhaustion::NoData),
                Err(err) => {
                    warn!(resource, page = requests, kind = %err.kind(), error = %err, "Page fetch failed");
                    break FetchStatus::Failed(err);
                }
            };

            if result.items.is_empty() {
                break FetchStatus::Complete(Exhaustion::EmptyPage);
            }

            let page_len = result.items.len();
            let trailing = self.trailing_identifier(&result.items, identify);
            let absorbed = state.absorb(result.items, identify);

            debug!(
                resource,
                page = requests,
                items = page_len,
                new = absorbed.new,
                duplicates = absorbed.duplicates,
                unidentified = absorbed.unidentified,
                total = state.accumulated.len(),
                "Fetched page"
            );

            if absorbed.new == 0 && absorbed.duplicates > 0 {
                warn!(
                    resource,
                    page = requests,
                    duplicates = absorbed.duplicates,
                    "Page repeated only known items, stopping; check cursor advancement if this is unexpected"
                );
                break FetchStatus::Complete(Exhaustion::AllDuplicates);
            }

            if page_len < initial.page_size {
                break FetchStatus::Complete(Exhaustion::ShortPage);
            }

            match &self.options.paging {
                Paging::Cursor {
                    direction: Direction::Around,
                    ..
                } => {
                    warn!(resource, "Around direction does not continue past one page");
                    break FetchStatus::SingleShot;
                }
                Paging::Cursor { .. } => match trailing {
                    Some(id) => state.cursor = Some(CursorPosition::Id(id)),
                    None => {
                        warn!(resource, page = requests, "Trailing item has no identifier, cannot advance cursor");
                        break FetchStatus::Stalled;
                    }
                },
                Paging::Page { first_page, .. } => {
                    let next = match state.cursor {
                        Some(CursorPosition::Page(n)) => n + 1,
                        _ => *first_page + 1,
                    };
                    state.cursor = Some(CursorPosition::Page(next));
                }
                Paging::Offset { .. } => {
                    let current = match state.cursor {
                        Some(CursorPosition::Offset(n)) => n,
                        _ => 0,
                    };
                    state.cursor = Some(CursorPosition::Offset(current + initial.page_size as u64));
                }
            }
        };

        info!(
            resource,
            status = status.label(),
            requests,
            records = state.accumulated.len(),
            "Pagination finished"
        );

        PageRun {
            state,
            status,
            requests,
        }
    }

    fn page_request(&self, initial: &FetchRequest, cursor: Option<&CursorPosition>) -> FetchRequest {
        let mut request = initial.clone();
        request.extra_params.insert(
            self.options.page_size_param.clone(),
            initial.page_size.to_string(),
        );
        request.cursor = cursor.map(CursorPosition::to_param);

        match &self.options.paging {
            Paging::Cursor {
                cursor_param,
                direction,
                direction_param,
            } => {
                if let Some(param) = direction_param {
                    request
                        .extra_params
                        .insert(param.clone(), direction.as_str().to_string());
                }
                if let Some(cursor) = &request.cursor {
                    request.extra_params.insert(cursor_param.clone(), cursor.clone());
                }
            }
            Paging::Page { page_param: param, .. } | Paging::Offset { offset_param: param } => {
                if let Some(cursor) = &request.cursor {
                    request.extra_params.insert(param.clone(), cursor.clone());
                }
            }
        }
        request
    }

    fn trailing_identifier<I>(&self, items: &[Record], identify: &I) -> Option<Identifier>
    where
        I: Fn(&Record) -> Option<Identifier>,
    {
        let trailing = match self.options.paging.direction() {
            Direction::After => items.first(),
            Direction::Before | Direction::Around => items.last(),
        };
        trailing.and_then(identify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(id: &str) -> Record {
        json!({ "id": id }).as_object().unwrap().clone()
    }

    fn by_id(r: &Record) -> Option<Identifier> {
        r.get("id").and_then(|v| v.as_str()).map(Identifier::from)
    }

    fn options(paging: Paging) -> PaginationOptions {
        PaginationOptions::new(paging).with_throttle(Duration::ZERO)
    }

    #[test]
    fn test_first_request_params() {
        let paginator = Paginator::new(options(Paging::messages(Direction::Before)));
        let initial = FetchRequest::new("chat", 100).with_param("viewerId", "u1");
        let request = paginator.page_request(&initial, None);

        assert_eq!(request.extra_params.get("limit").unwrap(), "100");
        assert_eq!(request.extra_params.get("direction").unwrap(), "Before");
        assert_eq!(request.extra_params.get("viewerId").unwrap(), "u1");
        assert!(!request.extra_params.contains_key("fromMessageId"));
    }

    #[test]
    fn test_page_params_use_configured_names() {
        let paginator =
            Paginator::new(options(Paging::pages()).with_page_size_param("perPage"));
        let request = paginator.page_request(&FetchRequest::new("members", 250), Some(&CursorPosition::Page(2)));
        assert_eq!(request.extra_params.get("perPage").unwrap(), "250");
        assert_eq!(request.extra_params.get("page").unwrap(), "2");
        assert_eq!(request.cursor.as_deref(), Some("2"));
    }

    #[test]
    fn test_after_uses_first_item() {
        let paginator = Paginator::new(options(Paging::messages(Direction::After)));
        let items = vec![rec("a"), rec("b"), rec("c")];
        assert_eq!(
            paginator.trailing_identifier(&items, &by_id),
            Some(Identifier::new("a"))
        );
    }

    #[test]
    fn test_absorb_counts() {
        let mut state = PaginationState::default();
        let absorbed = state.absorb(vec![rec("a"), rec("a"), json!({"x": 1}).as_object().unwrap().clone()], &by_id);
        assert_eq!(
            absorbed,
            Absorbed {
                new: 1,
                duplicates: 1,
                unidentified: 1
            }
        );
        assert_eq!(state.accumulated.len(), 1);
    }

    #[test]
    fn test_offset_advances_by_page_size() {
        let paginator = Paginator::new(options(Paging::offset()));
        let mut calls = Vec::new();
        let mut source = |req: &FetchRequest| -> Result<Option<FetchResult>, FetchError> {
            calls.push(req.extra_params.get("offset").cloned().unwrap());
            let n = calls.len();
            let items = if n < 3 {
                vec![rec(&format!("{n}a")), rec(&format!("{n}b"))]
            } else {
                vec![rec("last")]
            };
            Ok(Some(FetchResult::direct(items)))
        };

        let run = paginator.fetch_all(&FetchRequest::new("users", 2), &mut source, by_id);
        assert_eq!(run.status, FetchStatus::Complete(Exhaustion::ShortPage));
        assert_eq!(run.records().len(), 5);
        assert_eq!(calls, vec!["0", "2", "4"]);
    }

    #[test]
    fn test_around_is_single_shot() {
        let paginator = Paginator::new(options(Paging::messages(Direction::Around)));
        let mut source = |_: &FetchRequest| -> Result<Option<FetchResult>, FetchError> {
            Ok(Some(FetchResult::direct(vec![rec("a"), rec("b")])))
        };
        let run = paginator.fetch_all(&FetchRequest::new("chat", 2).with_cursor("m"), &mut source, by_id);
        assert_eq!(run.status, FetchStatus::SingleShot);
        assert_eq!(run.requests, 1);
        assert!(run.is_complete());
    }

    #[test]
    fn test_stalled_when_trailing_item_lacks_id() {
        let paginator = Paginator::new(options(Paging::messages(Direction::Before)));
        let mut source = |_: &FetchRequest| -> Result<Option<FetchResult>, FetchError> {
            let nameless = json!({"text": "no id"}).as_object().unwrap().clone();
            Ok(Some(FetchResult::direct(vec![rec("a"), nameless])))
        };
        let run = paginator.fetch_all(&FetchRequest::new("chat", 2), &mut source, by_id);
        assert_eq!(run.status, FetchStatus::Stalled);
        assert_eq!(run.status.error_kind(), Some(ErrorKind::StalledPagination));
        assert_eq!(run.records().len(), 1);
    }

    #[test]
    fn test_budget_exhausted_is_truncated() {
        let paginator =
            Paginator::new(options(Paging::pages()).with_max_iterations(3));
        let mut page = 0;
        let mut source = |_: &FetchRequest| -> Result<Option<FetchResult>, FetchError> {
            page += 1;
            Ok(Some(FetchResult::direct(vec![rec(&format!("p{page}"))])))
        };
        let run = paginator.fetch_all(&FetchRequest::new("activities", 1), &mut source, by_id);
        assert_eq!(run.status, FetchStatus::Truncated);
        assert_eq!(run.requests, 3);
        assert_eq!(run.records().len(), 3);
        assert!(!run.is_complete());
    }

    #[test]
    fn test_no_data_is_exhaustion() {
        let paginator = Paginator::new(options(Paging::pages()));
        let mut source = |_: &FetchRequest| -> Result<Option<FetchResult>, FetchError> { Ok(None) };
        let run = paginator.fetch_all(&FetchRequest::new("x", 10), &mut source, by_id);
        assert_eq!(run.status, FetchStatus::Complete(Exhaustion::NoData));
        assert!(run.into_result().unwrap().is_empty());
    }

    #[test]
    fn test_into_result_carries_partial_records() {
        let paginator = Paginator::new(options(Paging::pages()));
        let mut page = 0;
        let mut source = |_: &FetchRequest| -> Result<Option<FetchResult>, FetchError> {
            page += 1;
            if page == 2 {
                return Err(FetchError::from_status(500, "/x", "boom"));
            }
            Ok(Some(FetchResult::direct(vec![rec("a")])))
        };
        let run = paginator.fetch_all(&FetchRequest::new("x", 1), &mut source, by_id);
        let err = run.into_result().unwrap_err();
        assert_eq!(err.error.kind(), ErrorKind::ServerError);
        assert_eq!(err.records.len(), 1);
    }

    #[test]
    fn test_state_serde_roundtrip() {
        let mut state = PaginationState::new(Direction::Before);
        state.absorb(vec![rec("a"), rec("b")], &by_id);
        state.cursor = Some(CursorPosition::Id(Identifier::new("b")));
        state.request_count = 1;

        let json = serde_json::to_string(&state).unwrap();
        let back: PaginationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
