//! Tests for the submission controller outside HTTP
//!
//! Covers notification isolation, read-once confirmations and concurrent
//! submits from many sessions sharing one pipeline.

use relform_common::config::{Config, NotifyConfig};
use relform_common::CommitPipeline;
use relform_server::controller::{SubmissionController, SubmitOutcome};
use relform_server::notify::{MailTransport, NotifyError, Notifier, OutboundMessage};
use relform_server::pending::PendingResultStore;
use relform_server::validation::RawSubmission;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

/// Transport that refuses every message but counts attempts
#[derive(Debug, Default)]
struct FailingTransport {
    attempts: AtomicUsize,
}

impl MailTransport for FailingTransport {
    fn deliver(&self, message: &OutboundMessage) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(NotifyError::Rejected {
            to: message.to.clone(),
            reason: "relay unavailable".to_string(),
        })
    }
}

fn setup(transport: Arc<dyn MailTransport>) -> (TempDir, SubmissionController) {
    let dir = TempDir::new().unwrap();
    let config = Config {
        data_dir: dir.path().join("data"),
        ..Config::default()
    };
    config.layout().ensure_directories().unwrap();

    let notify = NotifyConfig {
        enabled: true,
        send_copy: true,
        ..NotifyConfig::default()
    };
    let controller = SubmissionController::new(
        Arc::new(CommitPipeline::from_config(&config).unwrap()),
        PendingResultStore::new(Duration::from_secs(60)),
        Arc::new(Notifier::new(notify, transport)),
    );
    (dir, controller)
}

fn complete(title: &str) -> RawSubmission {
    let mut raw = RawSubmission::default();
    raw.set("type", "アルバム");
    raw.set("title", title);
    raw.set("producer", "kz");
    raw.set("date", "2008-05-21");
    raw.push("media", "CD");
    raw.push("vocaloid_chars", "初音ミク");
    raw.set("email", "kz@example.jp");
    raw
}

#[tokio::test]
async fn test_failed_notification_keeps_commit() {
    let transport = Arc::new(FailingTransport::default());
    let (_dir, controller) = setup(transport.clone());
    let session = Uuid::new_v4();

    let outcome = controller.submit(session, complete("Re:package")).await.unwrap();
    let SubmitOutcome::Committed(record) = outcome else {
        panic!("Expected commit");
    };
    assert_eq!(record.sequence, 1);

    // Staff message and submitter copy were both attempted
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(controller.pipeline().ledger().read_all().unwrap().len(), 1);
    assert_eq!(controller.take_confirmation(session).await, Some(record));
}

#[tokio::test]
async fn test_invalid_submission_parks_nothing() {
    let (_dir, controller) = setup(Arc::new(FailingTransport::default()));
    let session = Uuid::new_v4();

    let mut raw = complete("");
    raw.set("email", "");
    let outcome = controller.submit(session, raw).await.unwrap();
    let SubmitOutcome::Invalid(rejected) = outcome else {
        panic!("Expected rejection");
    };
    let flagged: BTreeSet<&str> = rejected.errors.iter().map(|f| f.as_str()).collect();
    assert_eq!(flagged, BTreeSet::from(["title", "twitter", "email"]));

    assert!(controller.pending().is_empty().await);
    assert!(controller.pipeline().ledger().read_all().unwrap().is_empty());
}

#[tokio::test]
async fn test_confirmation_read_once() {
    let (_dir, controller) = setup(Arc::new(FailingTransport::default()));
    let session = Uuid::new_v4();

    controller.submit(session, complete("Packaged")).await.unwrap();
    assert!(controller.take_confirmation(session).await.is_some());
    assert!(controller.take_confirmation(session).await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_get_distinct_sequences() {
    let (_dir, controller) = setup(Arc::new(FailingTransport::default()));
    let controller = Arc::new(controller);

    let mut handles = Vec::new();
    for i in 0..16 {
        let controller = Arc::clone(&controller);
        handles.push(tokio::spawn(async move {
            let session = Uuid::new_v4();
            controller
                .submit(session, complete(&format!("曲{}", i)))
                .await
                .unwrap();
            controller.take_confirmation(session).await.unwrap().sequence
        }));
    }

    let mut sequences = Vec::new();
    for handle in handles {
        sequences.push(handle.await.unwrap());
    }
    sequences.sort_unstable();
    assert_eq!(sequences, (1..=16).collect::<Vec<u64>>());
    assert_eq!(controller.pipeline().ledger().read_all().unwrap().len(), 16);
}
