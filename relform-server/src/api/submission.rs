//! Form, commit and confirmation routes
//!
//! POST /create never renders the confirmation itself: a commit answers
//! with 303 See Other to /thanks, so reloading the confirmation page is a
//! plain GET.

use axum::{
    extract::{multipart::Field as MultipartField, Multipart, State},
    response::{Html, Redirect, Response},
    routing::{get, post},
    Router,
};
use relform_common::upload::TransientUpload;
use std::collections::BTreeSet;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::controller::SubmitOutcome;
use crate::error::ApiResult;
use crate::session::Session;
use crate::validation::{RawSubmission, SubmissionForm};
use crate::{views, AppState};

/// Form key of the file input
pub const UPLOAD_KEY: &str = "image_file";

/// GET /
pub async fn new_form(State(state): State<AppState>, session: Session) -> Response {
    state.controller.begin(session.id).await;
    session.attach(Html(views::form_page(
        &SubmissionForm::default(),
        &BTreeSet::new(),
    )))
}

/// POST /create
pub async fn create(
    State(state): State<AppState>,
    session: Session,
    multipart: Multipart,
) -> ApiResult<Response> {
    let raw = read_submission(multipart, &state.upload_spool).await?;
    match state.controller.submit(session.id, raw).await? {
        SubmitOutcome::Invalid(rejected) => Ok(session.attach(Html(views::form_page(
            &rejected.form,
            &rejected.errors,
        )))),
        SubmitOutcome::Committed(_) => Ok(session.attach(Redirect::to("/thanks"))),
    }
}

/// GET /thanks
pub async fn thanks(State(state): State<AppState>, session: Session) -> Response {
    let record = state.controller.take_confirmation(session.id).await;
    session.attach(Html(views::thanks_page(record.as_ref())))
}

/// Split a multipart name into form key and list flag
///
/// `relinfo[media][]` is `("media", true)`, `relinfo[title]` and `title`
/// are `("title", false)`.
pub fn parse_field_name(name: &str) -> Option<(String, bool)> {
    let (key, is_list) = match name.strip_prefix("relinfo[") {
        Some(inner) => match inner.strip_suffix("][]") {
            Some(key) => (key, true),
            None => (inner.strip_suffix(']')?, false),
        },
        None => match name.strip_suffix("[]") {
            Some(key) => (key, true),
            None => (name, false),
        },
    };
    if key.is_empty() || key.contains(['[', ']']) {
        return None;
    }
    Some((key.to_string(), is_list))
}

async fn read_submission(mut multipart: Multipart, spool: &Path) -> ApiResult<RawSubmission> {
    let mut raw = RawSubmission::default();
    while let Some(field) = multipart
        .next_field()
        .await?
    {
        let Some((key, is_list)) = field.name().and_then(parse_field_name) else {
            debug!(name = ?field.name(), "Ignoring unexpected form field");
            continue;
        };

        if key == UPLOAD_KEY {
            raw.upload = spool_upload(field, spool).await?;
            continue;
        }

        let value = field.text().await?;
        if is_list {
            raw.push(key, value);
        } else {
            raw.set(key, value);
        }
    }
    Ok(raw)
}

/// Stream a file part to the spool directory
///
/// An empty part with no filename is a file input left empty.
async fn spool_upload(
    mut field: MultipartField<'_>,
    spool: &Path,
) -> ApiResult<Option<TransientUpload>> {
    let original_name = field.file_name().unwrap_or("").to_string();
    let content_type = field.content_type().map(str::to_string);

    let (file, temp_path) = NamedTempFile::new_in(spool)?.into_parts();
    let mut file = tokio::fs::File::from_std(file);
    let mut written: u64 = 0;
    while let Some(chunk) = field
        .chunk()
        .await?
    {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    if written == 0 && original_name.is_empty() {
        return Ok(None);
    }
    debug!(original = %original_name, bytes = written, "Spooled upload");
    Ok(Some(TransientUpload {
        temp_path,
        original_name,
        content_type,
    }))
}

/// Build submission routes
pub fn submission_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(new_form))
        .route("/create", post(create))
        .route("/thanks", get(thanks))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field_name() {
        assert_eq!(parse_field_name("relinfo[title]"), Some(("title".into(), false)));
        assert_eq!(parse_field_name("relinfo[media][]"), Some(("media".into(), true)));
        assert_eq!(parse_field_name("media[]"), Some(("media".into(), true)));
        assert_eq!(parse_field_name("email"), Some(("email".into(), false)));
        assert_eq!(parse_field_name("relinfo[]"), None);
        assert_eq!(parse_field_name("relinfo[a][b]"), None);
    }
}
