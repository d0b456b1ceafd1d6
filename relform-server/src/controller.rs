//! Submission flow orchestration
//!
//! ```text
//! Idle -> Validating -> Invalid -> (redisplay) Idle
//!                    -> Committing -> Committed -> Delivering
//!                       -> AwaitingConfirmationRead -> (confirmation read) Idle
//! ```
//!
//! Only `Committing` takes the commit lock. Notification runs after the
//! commit and its failure is logged, never propagated. The committed record
//! is parked in the pending store and the HTTP layer redirects, so a reload
//! of the confirmation page cannot commit again.

use crate::error::{ApiError, ApiResult};
use crate::notify::Notifier;
use crate::pending::PendingResultStore;
use crate::validation::{self, RawSubmission, Rejected};
use relform_common::{CommitPipeline, SubmissionRecord};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Validating,
    Invalid,
    Committing,
    Committed,
    Delivering,
    AwaitingConfirmationRead,
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Result of a form post
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Redisplay the form with the flagged fields
    Invalid(Rejected),
    /// Committed and parked for the confirmation page
    Committed(SubmissionRecord),
}

#[derive(Debug)]
pub struct SubmissionController {
    pipeline: Arc<CommitPipeline>,
    pending: PendingResultStore,
    notifier: Arc<Notifier>,
}

fn enter(session: Uuid, state: SubmissionState) {
    debug!(session = %session, state = %state, "Submission state");
}

impl SubmissionController {
    pub fn new(
        pipeline: Arc<CommitPipeline>,
        pending: PendingResultStore,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            pipeline,
            pending,
            notifier,
        }
    }

    pub fn pipeline(&self) -> &Arc<CommitPipeline> {
        &self.pipeline
    }

    pub fn pending(&self) -> &PendingResultStore {
        &self.pending
    }

    /// A fresh form was requested; stale confirmation state is dropped
    pub async fn begin(&self, session: Uuid) {
        enter(session, SubmissionState::Idle);
        self.pending.clear(session).await;
    }

    /// Validate and, when valid, commit a posted form
    ///
    /// Errors are fatal commit failures: nothing was recorded and nothing
    /// is parked for confirmation.
    pub async fn submit(&self, session: Uuid, mut raw: RawSubmission) -> ApiResult<SubmitOutcome> {
        enter(session, SubmissionState::Validating);
        let upload = raw.upload.take();
        let fields = match validation::validate(&raw) {
            Ok(fields) => fields,
            Err(rejected) => {
                enter(session, SubmissionState::Invalid);
                debug!(session = %session, errors = ?rejected.errors, "Submission rejected");
                // Dropping `upload` deletes the spooled file
                return Ok(SubmitOutcome::Invalid(rejected));
            }
        };

        enter(session, SubmissionState::Committing);
        let pipeline = Arc::clone(&self.pipeline);
        let record = tokio::task::spawn_blocking(move || pipeline.commit(fields, upload))
            .await
            .map_err(|e| ApiError::Internal(format!("Commit task failed: {}", e)))??;

        enter(session, SubmissionState::Committed);
        self.notify(&record).await;

        enter(session, SubmissionState::Delivering);
        self.pending.put(session, record.clone()).await;

        enter(session, SubmissionState::AwaitingConfirmationRead);
        info!(session = %session, sequence = record.sequence, "Submission accepted");
        Ok(SubmitOutcome::Committed(record))
    }

    async fn notify(&self, record: &SubmissionRecord) {
        let notifier = Arc::clone(&self.notifier);
        let record = record.clone();
        let sequence = record.sequence;
        match tokio::task::spawn_blocking(move || notifier.dispatch(&record)).await {
            Ok(Ok(0)) => {}
            Ok(Ok(sent)) => debug!(sequence, sent, "Notifications dispatched"),
            Ok(Err(e)) => warn!(sequence, "Notification failed, submission kept: {}", e),
            Err(e) => warn!(sequence, "Notification task failed: {}", e),
        }
    }

    /// Read-once confirmation for `session`
    pub async fn take_confirmation(&self, session: Uuid) -> Option<SubmissionRecord> {
        let record = self.pending.take(session).await;
        if record.is_some() {
            enter(session, SubmissionState::Idle);
        }
        record
    }
}
