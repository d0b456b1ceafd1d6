//! Staff notification and submitter confirmation copy
//!
//! Messages are rendered here and handed to a [`MailTransport`]. Delivery
//! problems are reported to the caller, which logs them; they never undo
//! a commit.

use base64::Engine;
use chrono::Utc;
use relform_common::config::{Config, NotifyConfig, TransportKind};
use relform_common::ledger::COLUMNS;
use relform_common::SubmissionRecord;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Spool write failed: {0}")]
    Io(#[from] io::Error),

    #[error("Transport rejected message to {to}: {reason}")]
    Rejected { to: String, reason: String },
}

/// A rendered plain-text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

impl OutboundMessage {
    /// Internet message format with UTF-8 body
    pub fn to_rfc5322(&self) -> String {
        format!(
            "Date: {}\r\nFrom: {}\r\nTo: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\n\
             Content-Type: text/plain; charset=utf-8\r\nContent-Transfer-Encoding: 8bit\r\n\r\n{}",
            Utc::now().to_rfc2822(),
            encode_header(&self.from),
            encode_header(&self.to),
            encode_header(&self.subject),
            self.body.replace('\n', "\r\n"),
        )
    }
}

/// Header-safe text: control characters become spaces, so a value can
/// never end the header line; non-ASCII text becomes an RFC 2047
/// encoded-word
fn encode_header(text: &str) -> String {
    let text: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if text.is_ascii() {
        return text;
    }
    format!(
        "=?UTF-8?B?{}?=",
        base64::engine::general_purpose::STANDARD.encode(text.as_bytes())
    )
}

/// Hands rendered messages to whatever actually delivers mail
pub trait MailTransport: Send + Sync + fmt::Debug {
    fn deliver(&self, message: &OutboundMessage) -> Result<(), NotifyError>;
}

/// Writes messages to the log only
#[derive(Debug, Default)]
pub struct LogTransport;

impl MailTransport for LogTransport {
    fn deliver(&self, message: &OutboundMessage) -> Result<(), NotifyError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "Notification (log transport):\n{}",
            message.body
        );
        Ok(())
    }
}

/// Drops `.eml` files into a directory picked up by an external mailer
#[derive(Debug, Clone)]
pub struct SpoolTransport {
    dir: PathBuf,
}

impl SpoolTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl MailTransport for SpoolTransport {
    fn deliver(&self, message: &OutboundMessage) -> Result<(), NotifyError> {
        fs::create_dir_all(&self.dir)?;
        let name = format!(
            "{}-{}.eml",
            Utc::now().format("%Y%m%d%H%M%S"),
            Uuid::new_v4().simple()
        );
        // Complete file appears under its final name in one rename
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(message.to_rfc5322().as_bytes())?;
        tmp.persist(self.dir.join(&name)).map_err(|e| e.error)?;
        info!(to = %message.to, "Spooled notification {}", name);
        Ok(())
    }
}

/// Renders and dispatches messages for committed records
#[derive(Debug, Clone)]
pub struct Notifier {
    config: NotifyConfig,
    transport: Arc<dyn MailTransport>,
}

impl Notifier {
    pub fn new(config: NotifyConfig, transport: Arc<dyn MailTransport>) -> Self {
        Self { config, transport }
    }

    pub fn from_config(config: &Config) -> Self {
        let transport: Arc<dyn MailTransport> = match config.notify.transport {
            TransportKind::Log => Arc::new(LogTransport),
            TransportKind::Spool => Arc::new(SpoolTransport::new(config.spool_dir())),
        };
        Self::new(config.notify.clone(), transport)
    }

    fn listing(record: &SubmissionRecord) -> String {
        COLUMNS
            .iter()
            .map(|column| format!("{}: {}", column.name(), column.value(record)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Messages due for `record`; empty when notification is disabled
    pub fn messages(&self, record: &SubmissionRecord) -> Vec<OutboundMessage> {
        if !self.config.enabled {
            return Vec::new();
        }
        let title = &record.fields.title;
        let listing = Self::listing(record);

        let mut messages = vec![OutboundMessage {
            to: self.config.to.clone(),
            from: self.config.from.clone(),
            subject: format!("{} {}", self.config.subject_prefix, title),
            body: listing.clone(),
        }];

        if self.config.send_copy {
            if let Some(email) = &record.fields.email {
                messages.push(OutboundMessage {
                    to: email.clone(),
                    from: self.config.copy_from.clone(),
                    subject: format!("{} Submission received: {}", self.config.subject_prefix, title),
                    body: format!(
                        "Thank you for your submission. We received the following:\n\n{}",
                        listing
                    ),
                });
            }
        }
        messages
    }

    /// Deliver every due message; returns how many were delivered
    ///
    /// All messages are attempted; the first failure is returned.
    pub fn dispatch(&self, record: &SubmissionRecord) -> Result<usize, NotifyError> {
        let mut delivered = 0;
        let mut first_error = None;
        for message in self.messages(record) {
            match self.transport.deliver(&message) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(delivered),
        }
    }
}
