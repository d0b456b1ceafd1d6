//! Submission commit critical section
//!
//! Order inside the lock: allocate sequence, stamp, bind upload, append
//! ledger row, persist counter. Any failure before the append leaves no
//! durable trace; the lock guard is released on every path.

use crate::config::{Config, DataLayout};
use crate::ledger::{encoding_for_label, RecordLedger};
use crate::lock::{CommitLock, FileCommitLock};
use crate::record::{ReleaseFields, SubmissionRecord, STAMP_FORMAT};
use crate::sequence::SequenceAllocator;
use crate::upload::{TransientUpload, UploadBinder};
use crate::Result;
use chrono::Local;
use std::sync::Arc;
use tracing::{error, info};

/// Everything that must happen atomically for one submission
#[derive(Debug, Clone)]
pub struct CommitPipeline {
    lock: Arc<dyn CommitLock>,
    sequence: SequenceAllocator,
    binder: UploadBinder,
    ledger: RecordLedger,
}

impl CommitPipeline {
    pub fn new(
        lock: Arc<dyn CommitLock>,
        sequence: SequenceAllocator,
        binder: UploadBinder,
        ledger: RecordLedger,
    ) -> Self {
        Self {
            lock,
            sequence,
            binder,
            ledger,
        }
    }

    /// File-backed pipeline over the data directory of `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let layout: DataLayout = config.layout();
        let encoding = encoding_for_label(&config.ledger_encoding)?;
        Ok(Self::new(
            Arc::new(FileCommitLock::new(&layout.lock, config.lock_timeout())),
            SequenceAllocator::new(&layout.sequence),
            UploadBinder::new(&layout.images),
            RecordLedger::new(&layout.ledger, encoding),
        ))
    }

    pub fn ledger(&self) -> &RecordLedger {
        &self.ledger
    }

    pub fn sequence(&self) -> &SequenceAllocator {
        &self.sequence
    }

    /// Commit one validated submission and return the finalized record
    ///
    /// Blocks while another commit holds the lock.
    pub fn commit(
        &self,
        fields: ReleaseFields,
        upload: Option<TransientUpload>,
    ) -> Result<SubmissionRecord> {
        let _guard = self.lock.acquire()?;

        let sequence = self.sequence.next(&self.ledger)?;
        let timestamp = Local::now().format(STAMP_FORMAT).to_string();

        let upload = match upload {
            Some(upload) => Some(self.binder.bind(upload, sequence)?),
            None => None,
        };

        let record = SubmissionRecord {
            sequence,
            timestamp,
            fields,
            upload,
        };

        if let Err(e) = self.ledger.append(&record) {
            if let Some(bound) = &record.upload {
                self.binder.discard(bound);
            }
            return Err(e);
        }

        // The row is durable; a lost counter write is recovered from the
        // ledger by the next allocation.
        if let Err(e) = self.sequence.persist(sequence) {
            error!(sequence, "Ledger row written but counter not advanced: {}", e);
        }

        info!(
            sequence,
            title = %record.fields.title,
            upload = record.upload_attached(),
            "Committed submission"
        );
        Ok(record)
    }

    /// Repair the counter from the ledger under the commit lock
    pub fn reconcile(&self) -> Result<u64> {
        let _guard = self.lock.acquire()?;
        self.sequence.reconcile(&self.ledger)
    }
}
