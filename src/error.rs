//! Error types for the resource pruner.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot reach cluster: {0}")]
    Connection(String),

    #[error("unknown resource kind: {0}")]
    UnknownKind(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure to delete a single resource. Never aborts a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeleteError {
    #[error("{name} is already gone")]
    NotFound { name: String },

    #[error("delete rejected: {0}")]
    Api(String),
}
