use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use linkpull_core::FetchError;
use serde_json::Value;

use crate::client::{resolve_path, ApiClient, Params};

/// A request seen by [`MockClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub path: String,
    pub query: Params,
}

/// Scripted API client for testing.
///
/// Responses are queued per resolved path and served in order; the last
/// response for a path keeps being served once its queue is down to one.
#[derive(Clone, Default)]
pub struct MockClient {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    responses: HashMap<String, VecDeque<Result<Value, FetchError>>>,
    requests: Vec<RecordedRequest>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful body for a resolved path.
    pub fn respond(&self, path: impl Into<String>, body: Value) -> &Self {
        self.push(path.into(), Ok(body));
        self
    }

    /// Queue a failure for a resolved path.
    pub fn fail(&self, path: impl Into<String>, error: FetchError) -> &Self {
        self.push(path.into(), Err(error));
        self
    }

    /// Queue an HTTP status failure for a resolved path.
    pub fn fail_status(&self, path: impl Into<String>, status: u16) -> &Self {
        let path = path.into();
        let error = FetchError::from_status(status, path.clone(), "mock error");
        self.push(path, Err(error));
        self
    }

    /// All requests, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Requests sent to one resolved path.
    pub fn requests_for(&self, path: &str) -> Vec<RecordedRequest> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub fn total_requests(&self) -> usize {
        self.lock().requests.len()
    }

    fn push(&self, path: String, response: Result<Value, FetchError>) {
        self.lock()
            .responses
            .entry(path)
            .or_default()
            .push_back(response);
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ApiClient for MockClient {
    fn get(
        &self,
        path_template: &str,
        path_params: &Params,
        query: &Params,
    ) -> Result<Value, FetchError> {
        let path = resolve_path(path_template, path_params)?;
        let mut state = self.lock();
        state.requests.push(RecordedRequest {
            path: path.clone(),
            query: query.clone(),
        });

        match state.responses.get_mut(&path) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::from_status(404, path, "mock queue empty"))),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(FetchError::from_status(404, path, "mock queue empty"))),
            None => Err(FetchError::from_status(404, path, "no mock response")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_queue_then_repeat_last() {
        let client = MockClient::new();
        client
            .respond("/a", json!([1]))
            .respond("/a", json!([2]));

        let get = || client.get("/a", &Params::new(), &Params::new()).unwrap();
        assert_eq!(get(), json!([1]));
        assert_eq!(get(), json!([2]));
        assert_eq!(get(), json!([2]));
        assert_eq!(client.total_requests(), 3);
    }

    #[test]
    fn test_unknown_path_is_not_found() {
        let client = MockClient::new();
        let err = client
            .get("/missing", &Params::new(), &Params::new())
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_records_resolved_path_and_query() {
        let client = MockClient::new();
        client.fail_status("/chats/channel/c9/messages", 403);

        let mut path_params = Params::new();
        path_params.insert("chatId".into(), "c9".into());
        let mut query = Params::new();
        query.insert("limit".into(), "100".into());

        let err = client
            .get("/chats/channel/{chatId}/messages", &path_params, &query)
            .unwrap_err();
        assert_eq!(err.status(), Some(403));

        let requests = client.requests_for("/chats/channel/c9/messages");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].query.get("limit").map(String::as_str), Some("100"));
    }
}
