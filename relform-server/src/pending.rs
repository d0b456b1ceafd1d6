//! One-shot confirmation slots for post-redirect-get
//!
//! After a commit the record is parked under the submitter's session id;
//! the confirmation page takes it exactly once. Starting a new form clears
//! the slot, and entries older than the TTL are evicted whenever a new
//! entry is stored.

use relform_common::SubmissionRecord;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug)]
struct PendingEntry {
    record: SubmissionRecord,
    stored_at: Instant,
}

/// Session-keyed, read-once store of just-committed records
#[derive(Debug)]
pub struct PendingResultStore {
    ttl: Duration,
    slots: Mutex<HashMap<Uuid, PendingEntry>>,
}

impl PendingResultStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Park `record` for `session`, replacing any earlier one
    pub async fn put(&self, session: Uuid, record: SubmissionRecord) {
        let mut slots = self.slots.lock().await;
        let before = slots.len();
        slots.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        if slots.len() < before {
            debug!(evicted = before - slots.len(), "Evicted stale confirmations");
        }
        slots.insert(
            session,
            PendingEntry {
                record,
                stored_at: Instant::now(),
            },
        );
    }

    /// Remove and return the record for `session`
    pub async fn take(&self, session: Uuid) -> Option<SubmissionRecord> {
        let entry = self.slots.lock().await.remove(&session)?;
        if entry.stored_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.record)
    }

    pub async fn clear(&self, session: Uuid) {
        self.slots.lock().await.remove(&session);
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relform_common::ReleaseFields;

    fn record(sequence: u64) -> SubmissionRecord {
        SubmissionRecord {
            sequence,
            timestamp: "2024-01-01 00:00:00".to_string(),
            fields: ReleaseFields::default(),
            upload: None,
        }
    }

    #[tokio::test]
    async fn test_take_is_read_once() {
        let store = PendingResultStore::new(Duration::from_secs(60));
        let session = Uuid::new_v4();
        store.put(session, record(3)).await;

        assert_eq!(store.take(session).await.map(|r| r.sequence), Some(3));
        assert_eq!(store.take(session).await, None);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = PendingResultStore::new(Duration::from_secs(60));
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.put(a, record(1)).await;

        assert_eq!(store.take(b).await, None);
        assert!(store.take(a).await.is_some());
    }

    #[tokio::test]
    async fn test_clear_drops_slot() {
        let store = PendingResultStore::new(Duration::from_secs(60));
        let session = Uuid::new_v4();
        store.put(session, record(1)).await;
        store.clear(session).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_put_replaces_previous() {
        let store = PendingResultStore::new(Duration::from_secs(60));
        let session = Uuid::new_v4();
        store.put(session, record(1)).await;
        store.put(session, record(2)).await;
        assert_eq!(store.len().await, 1);
        assert_eq!(store.take(session).await.map(|r| r.sequence), Some(2));
    }

    #[tokio::test]
    async fn test_expired_entries_evicted() {
        let store = PendingResultStore::new(Duration::from_millis(30));
        let stale = Uuid::new_v4();
        store.put(stale, record(1)).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(store.take(stale).await, None);

        store.put(stale, record(2)).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        store.put(Uuid::new_v4(), record(3)).await;
        assert_eq!(store.len().await, 1);
    }
}
