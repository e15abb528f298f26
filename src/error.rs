// Error types for the task model and its persistence

use crate::kv::KvError;

/// Errors surfaced by the library
///
/// Blank text and unknown ids are not errors; those operations report a
/// no-op through their return value instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Stored value under `key` is not a valid task document
    #[error("stored data under '{key}' is corrupted: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Stored document contains the same id twice
    #[error("stored data contains duplicate task id '{0}'")]
    DuplicateId(String),

    /// Backend failed while reading `key`
    #[error("failed to read '{key}' from storage: {source}")]
    Read {
        key: String,
        #[source]
        source: KvError,
    },

    /// Backend failed while writing `key`; in-memory state is ahead of storage
    #[error("failed to persist '{key}': {source}")]
    Write {
        key: String,
        #[source]
        source: KvError,
    },

    /// Task collection could not be serialized
    #[error("failed to encode tasks: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("invalid priority '{0}' (expected high, medium or low)")]
    InvalidPriority(String),

    #[error("invalid status filter '{0}' (expected all, completed or pending)")]
    InvalidStatusFilter(String),
}

impl Error {
    /// True when the error means stored data could not be trusted
    pub fn is_corrupted(&self) -> bool {
        matches!(self, Error::Decode { .. } | Error::DuplicateId(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
