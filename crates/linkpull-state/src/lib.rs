mod archive;
mod error;
mod file;

pub use archive::{
    parse_timestamped_name, resolve_timestamped, timestamped_name, ArchiveContent, ArchiveFormat,
    ArchiveWriter, SaveDecision, TIMESTAMP_FORMAT,
};
pub use error::{StateError, StateResult};
pub use file::FileCheckpointStore;
