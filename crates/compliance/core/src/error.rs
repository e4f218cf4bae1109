use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while producing canonical bytes or chain hashes.
#[derive(Debug, Error)]
pub enum CanonicalError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("record must serialize to a JSON object")]
    NotAnObject,

    #[error("record is missing chain field `{0}`")]
    MissingField(&'static str),
}

impl From<serde_json::Error> for CanonicalError {
    fn from(e: serde_json::Error) -> Self {
        CanonicalError::Serialization(e.to_string())
    }
}

/// Errors from the line-oriented log file.
#[derive(Debug, Error)]
pub enum LogFileError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid log line: {0}")]
    InvalidLine(String),
}

impl LogFileError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| LogFileError::Io { path, source }
    }
}
