//! # relform common library
//!
//! Durable state and shared types for the release submission form:
//! - Submission data model and ledger column schema
//! - Configuration loading
//! - Commit pipeline: lock, sequence allocation, upload binding, ledger append

pub mod commit;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lock;
pub mod record;
pub mod sequence;
pub mod upload;

pub use commit::CommitPipeline;
pub use error::{Error, Result};
pub use record::{Field, ReleaseFields, SubmissionRecord, UploadRef};
