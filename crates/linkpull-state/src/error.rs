use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("corrupt checkpoint file: {0}")]
    Corrupt(String),
}

impl StateError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StateError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

impl From<StateError> for linkpull_core::Error {
    fn from(err: StateError) -> Self {
        linkpull_core::Error::Store(Box::new(err))
    }
}

pub type StateResult<T> = Result<T, StateError>;
