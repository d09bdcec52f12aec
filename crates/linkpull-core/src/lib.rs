pub mod batch;
pub mod checkpoint;
pub mod dedup;
pub mod envelope;
pub mod error;
pub mod identifier;
pub mod paginate;
pub mod registry;
pub mod report;
pub mod types;

pub use batch::{BatchReport, BatchRunner, ErrorHistogram, ResourceFailure};
pub use checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
pub use dedup::SeenIds;
pub use envelope::{EnvelopeShape, Unwrapper};
pub use error::{truncate_body, Error, ErrorKind, FetchError, Result};
pub use identifier::{CompositeKey, IdentifierSpec};
pub use paginate::{
    Exhaustion, FetchStatus, PageRun, PageSource, PaginationOptions, PaginationState, Paginator,
    Paging,
};
pub use registry::{EndpointSpec, Registry};
pub use types::{CursorPosition, Direction, FetchRequest, FetchResult, Identifier, Record};
