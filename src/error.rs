use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog unavailable at {path}: {reason}")]
    Unavailable { path: PathBuf, reason: String },
}

/// Caller errors from the vote path. Persistence problems never show up here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoteError {
    #[error("Unknown poll: {0}")]
    UnknownPoll(String),

    #[error("Invalid option '{option}' for poll {poll_id}")]
    InvalidOption { poll_id: String, option: String },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to read snapshot {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    #[error("Failed to write snapshot {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Flush task is not running")]
    FlusherStopped,
}
