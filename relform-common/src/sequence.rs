//! Sequence number allocation
//!
//! The counter file holds the last issued sequence as plain text. It is
//! only a cache of the ledger's highest sequence: allocation always takes
//! the larger of the two, so a counter write lost after a successful
//! append cannot cause a sequence to be issued twice.
//!
//! Callers must hold the commit lock around `next`/`persist`.

use crate::ledger::RecordLedger;
use crate::{Error, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// Reads and writes the persisted sequence counter
#[derive(Debug, Clone)]
pub struct SequenceAllocator {
    path: PathBuf,
}

impl SequenceAllocator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last persisted sequence; an absent or empty file means none issued
    pub fn last_persisted(&self) -> Result<u64> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(Error::SequenceRead {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })
            }
        };

        let first_line = content.lines().next().unwrap_or("").trim();
        if first_line.is_empty() {
            return Ok(0);
        }
        first_line.parse().map_err(|_| Error::SequenceRead {
            path: self.path.clone(),
            reason: format!("not a sequence number: {:?}", first_line),
        })
    }

    /// Next sequence to issue
    pub fn next(&self, ledger: &RecordLedger) -> Result<u64> {
        let counter = self.last_persisted()?;
        let in_ledger = ledger.last_sequence()?;
        if in_ledger > counter {
            warn!(
                counter,
                ledger = in_ledger,
                "Sequence counter behind ledger, continuing from ledger"
            );
        }
        counter
            .max(in_ledger)
            .checked_add(1)
            .ok_or_else(|| Error::SequenceRead {
                path: self.path.clone(),
                reason: "sequence exhausted".to_string(),
            })
    }

    /// Record `sequence` as the last issued value
    ///
    /// Written to a temporary file in the same directory and renamed into
    /// place, so readers never observe a partial number.
    pub fn persist(&self, sequence: u64) -> Result<()> {
        self.write_counter(sequence)
            .map_err(|source| Error::SequencePersist { sequence, source })
    }

    fn write_counter(&self, sequence: u64) -> io::Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        write!(tmp, "{}", sequence)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Bring the counter up to the ledger's highest sequence
    ///
    /// Returns the reconciled value. Never moves the counter backwards.
    pub fn reconcile(&self, ledger: &RecordLedger) -> Result<u64> {
        let counter = self.last_persisted()?;
        let in_ledger = ledger.last_sequence()?;
        if in_ledger > counter {
            info!(
                counter,
                ledger = in_ledger,
                "Repairing sequence counter from ledger"
            );
            self.persist(in_ledger)?;
            return Ok(in_ledger);
        }
        Ok(counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::encoding_for_label;
    use crate::record::{ReleaseFields, SubmissionRecord};
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (SequenceAllocator, RecordLedger) {
        let ledger = RecordLedger::new(
            dir.path().join("relinfo.csv"),
            encoding_for_label("utf-8").unwrap(),
        );
        (SequenceAllocator::new(dir.path().join("seq")), ledger)
    }

    fn row(sequence: u64) -> SubmissionRecord {
        SubmissionRecord {
            sequence,
            timestamp: "2024-01-01 00:00:00".to_string(),
            fields: ReleaseFields::default(),
            upload: None,
        }
    }

    #[test]
    fn test_missing_counter_bootstraps_at_one() {
        let dir = TempDir::new().unwrap();
        let (seq, ledger) = setup(&dir);
        assert_eq!(seq.last_persisted().unwrap(), 0);
        assert_eq!(seq.next(&ledger).unwrap(), 1);
    }

    #[test]
    fn test_empty_counter_file_is_zero() {
        let dir = TempDir::new().unwrap();
        let (seq, ledger) = setup(&dir);
        fs::write(seq.path(), "").unwrap();
        assert_eq!(seq.next(&ledger).unwrap(), 1);
    }

    #[test]
    fn test_corrupt_counter_is_fatal() {
        let dir = TempDir::new().unwrap();
        let (seq, ledger) = setup(&dir);
        fs::write(seq.path(), "twelve\n").unwrap();
        assert!(matches!(
            seq.next(&ledger),
            Err(Error::SequenceRead { .. })
        ));
    }

    #[test]
    fn test_saturated_counter_is_error_not_overflow() {
        let dir = TempDir::new().unwrap();
        let (seq, ledger) = setup(&dir);
        fs::write(seq.path(), u64::MAX.to_string()).unwrap();
        match seq.next(&ledger) {
            Err(Error::SequenceRead { reason, .. }) => assert_eq!(reason, "sequence exhausted"),
            other => panic!("Expected SequenceRead, got {:?}", other),
        }
    }

    #[test]
    fn test_persist_then_next() {
        let dir = TempDir::new().unwrap();
        let (seq, ledger) = setup(&dir);
        seq.persist(41).unwrap();
        assert_eq!(fs::read_to_string(seq.path()).unwrap(), "41");
        assert_eq!(seq.next(&ledger).unwrap(), 42);
    }

    #[test]
    fn test_ledger_ahead_of_counter_is_not_reused() {
        // Counter write lost after row 3 was appended
        let dir = TempDir::new().unwrap();
        let (seq, ledger) = setup(&dir);
        for n in 1..=3 {
            ledger.append(&row(n)).unwrap();
        }
        seq.persist(2).unwrap();

        assert_eq!(seq.next(&ledger).unwrap(), 4);
    }

    #[test]
    fn test_reconcile_repairs_counter_forward_only() {
        let dir = TempDir::new().unwrap();
        let (seq, ledger) = setup(&dir);
        ledger.append(&row(1)).unwrap();
        ledger.append(&row(2)).unwrap();

        assert_eq!(seq.reconcile(&ledger).unwrap(), 2);
        assert_eq!(seq.last_persisted().unwrap(), 2);

        seq.persist(9).unwrap();
        assert_eq!(seq.reconcile(&ledger).unwrap(), 9);
        assert_eq!(seq.last_persisted().unwrap(), 9);
    }
}
