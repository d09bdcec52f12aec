mod client;
mod mock;
mod retry;
mod source;

pub use client::{resolve_path, ApiClient, HttpClient, HttpSettings, Params};
pub use mock::{MockClient, RecordedRequest};
pub use retry::{AttemptError, RetryPolicy};
pub use source::{get_with_fallback, EndpointSource};
