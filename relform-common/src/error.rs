//! Common error types for relform

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for relform operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading configuration or committing a submission
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Sequence counter exists but cannot be read or parsed
    #[error("Sequence read error ({}): {reason}", path.display())]
    SequenceRead { path: PathBuf, reason: String },

    /// Sequence counter could not be written after a ledger append
    #[error("Sequence persist error for seq {sequence}: {source}")]
    SequencePersist {
        sequence: u64,
        #[source]
        source: std::io::Error,
    },

    /// Uploaded file could not be moved to its permanent location
    #[error("Upload relocation to {} failed: {source}", target.display())]
    UploadRelocation {
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Ledger row could not be written
    #[error("Ledger append failed for seq {sequence}: {source}")]
    LedgerAppend {
        sequence: u64,
        #[source]
        source: std::io::Error,
    },

    /// Field text cannot be represented in the ledger encoding
    #[error("Cannot transcode seq {sequence} to {encoding}")]
    Transcode {
        sequence: u64,
        encoding: &'static str,
    },

    /// Commit lock not obtained within the configured bound
    #[error("Timed out after {waited_ms}ms waiting for commit lock {}", path.display())]
    LockTimeout { path: PathBuf, waited_ms: u128 },

    /// Ledger CSV encoding/decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
