use thiserror::Error;
use ulid::Ulid;

use crate::cache::CacheError;
use storage::StorageError;

/// Errors surfaced by the scanner's public API
#[derive(Debug, Error)]
pub enum ScannerError {
    /// The scanner is not in the running state; queries cannot be served
    #[error("blocks scanner is not running")]
    NotRunning,

    /// The initial scan failed; the scanner never became usable
    #[error("initial blocks scan failed")]
    InitialScan(#[source] ScanError),

    /// The scanner was stopped before the initial scan completed
    #[error("blocks scanner stopped before completing the initial scan")]
    Stopped,

    /// `start` was called on a scanner that already left the new state
    #[error("blocks scanner already started")]
    AlreadyStarted,
}

/// Errors produced while scanning the bucket
#[derive(Debug, Error)]
pub enum ScanError {
    /// Object store error
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Metadata cache error (including corrupt bucket metadata)
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A block's deletion mark failed to parse
    #[error("corrupt deletion mark for block {block}")]
    CorruptDeletionMark {
        block: Ulid,
        #[source]
        source: serde_json::Error,
    },

    /// A block's deletion mark uses a format version this service doesn't know
    #[error("unsupported deletion mark version {version} for block {block}")]
    UnsupportedDeletionMarkVersion { block: Ulid, version: i32 },
}
