//! relform-server library
//!
//! HTTP front end of the release submission form: form rendering,
//! validation, the commit flow and the read-once confirmation page.

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use chrono::{DateTime, Utc};
use relform_common::config::Config;
use relform_common::CommitPipeline;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod controller;
pub mod error;
pub mod notify;
pub mod pending;
pub mod session;
pub mod validation;
pub mod views;

use controller::SubmissionController;
use notify::Notifier;
use pending::PendingResultStore;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<SubmissionController>,
    /// Where upload parts are streamed before commit
    pub upload_spool: PathBuf,
    /// Server startup timestamp (for uptime calculation)
    pub startup_time: DateTime<Utc>,
    /// Request body limit, multipart overhead included
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        controller: Arc<SubmissionController>,
        upload_spool: PathBuf,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            controller,
            upload_spool,
            startup_time: Utc::now(),
            max_upload_bytes,
        }
    }

    /// File-backed state over the data directory of `config`
    ///
    /// Creates the data directories when missing.
    pub fn from_config(config: &Config) -> relform_common::Result<Self> {
        let layout = config.layout();
        layout.ensure_directories()?;

        let controller = SubmissionController::new(
            Arc::new(CommitPipeline::from_config(config)?),
            PendingResultStore::new(config.pending_ttl()),
            Arc::new(Notifier::from_config(config)),
        );
        Ok(Self::new(
            Arc::new(controller),
            layout.tmp,
            config.max_upload_bytes,
        ))
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .merge(api::submission_routes())
        .merge(api::health_routes())
        .route("/api/buildinfo", get(api::get_build_info))
        .route("/static/style.css", get(api::serve_style_css))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
