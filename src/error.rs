use std::fmt;

/// Errors produced by the tables, the dictionary and the flattener.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An equal value is already stored.
    #[error("value already exists")]
    AlreadyExists,
    /// The value is not stored.
    #[error("value not found")]
    NotFound,
    /// The graph contains something the flattener cannot mirror. Fatal for
    /// the current run.
    #[error("internal error: {0}")]
    Internal(String),
    #[error("destination buffer too small: {needed} bytes needed, {capacity} available")]
    BufferTooSmall { needed: usize, capacity: usize },
    #[error("sized {sized} bytes but flattened {written}")]
    SizeMismatch { sized: usize, written: usize },
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Logs and builds an internal error.
pub(crate) fn internal(detail: impl fmt::Display) -> Error {
    let detail = detail.to_string();
    log::error!("Internal error ({}).", detail);
    Error::Internal(detail)
}
