//! Submission field validation
//!
//! Pure: turns the raw posted fields into [`ReleaseFields`] or a
//! [`Rejected`] value carrying the normalized form and the set of invalid
//! fields. Never touches the ledger or the filesystem.

use once_cell::sync::Lazy;
use regex::Regex;
use relform_common::upload::TransientUpload;
use relform_common::{Field, ReleaseFields};
use std::collections::{BTreeSet, HashMap};

/// Suffix of the free-text addendum key of a list field (`media_other`)
pub const OTHER_SUFFIX: &str = "_other";

/// Fields that must be non-blank
pub const REQUIRED: [Field; 6] = [
    Field::Title,
    Field::Category,
    Field::Producer,
    Field::Date,
    Field::Media,
    Field::VocaloidChars,
];

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern compiles")
});

/// Fields as posted, keyed by form key (`title`, `media`, `media_other`, ...)
#[derive(Debug, Default)]
pub struct RawSubmission {
    pub scalars: HashMap<String, String>,
    pub lists: HashMap<String, Vec<String>>,
    pub upload: Option<TransientUpload>,
}

impl RawSubmission {
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.scalars.insert(key.into(), value.into());
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.lists.entry(key.into()).or_default().push(value.into());
    }

    fn scalar(&self, key: &str) -> &str {
        self.scalars.get(key).map(String::as_str).unwrap_or("")
    }

    fn list(&self, key: &str) -> &[String] {
        self.lists.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Normalized values, kept for redisplaying the form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionForm {
    scalars: HashMap<Field, String>,
    lists: HashMap<Field, Vec<String>>,
    others: HashMap<Field, String>,
}

impl SubmissionForm {
    pub fn text(&self, field: Field) -> &str {
        self.scalars.get(&field).map(String::as_str).unwrap_or("")
    }

    pub fn list(&self, field: Field) -> &[String] {
        self.lists.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Free-text addendum as typed
    pub fn other(&self, field: Field) -> &str {
        self.others.get(&field).map(String::as_str).unwrap_or("")
    }

    fn optional(&self, field: Field) -> Option<String> {
        Some(self.text(field).to_string()).filter(|v| !v.is_empty())
    }
}

/// A submission that failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    pub form: SubmissionForm,
    pub errors: BTreeSet<Field>,
}

/// Trimmed value with line breaks and other control characters turned
/// into spaces; every field but the description is a single line
pub fn single_line(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Selected values plus the "other" addendum, blanks dropped, order kept
pub fn normalize_list(selected: &[String], other: &str) -> Vec<String> {
    selected
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(other))
        .map(single_line)
        .filter(|v| !v.is_empty())
        .collect()
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_PATTERN.is_match(value.trim())
}

fn normalize(raw: &RawSubmission) -> SubmissionForm {
    let mut form = SubmissionForm::default();
    for field in Field::ALL {
        let key = field.as_str();
        if field.is_list() {
            let other_key = format!("{}{}", key, OTHER_SUFFIX);
            let other = raw.scalar(&other_key);
            form.lists
                .insert(field, normalize_list(raw.list(key), other));
            form.others.insert(field, other.to_string());
        } else if field == Field::Description {
            form.scalars.insert(field, raw.scalar(key).trim().to_string());
        } else {
            form.scalars.insert(field, single_line(raw.scalar(key)));
        }
    }
    form
}

fn check(form: &SubmissionForm) -> BTreeSet<Field> {
    let mut errors = BTreeSet::new();

    for field in REQUIRED {
        let missing = if field.is_list() {
            form.list(field).is_empty()
        } else {
            form.text(field).is_empty()
        };
        if missing {
            errors.insert(field);
        }
    }

    if form.text(Field::Twitter).is_empty() && form.text(Field::Email).is_empty() {
        errors.insert(Field::Twitter);
        errors.insert(Field::Email);
    }

    let email = form.text(Field::Email);
    if !email.is_empty() && !is_valid_email(email) {
        errors.insert(Field::Email);
    }

    errors
}

/// Validate a raw submission
///
/// The upload, if any, is not inspected; the caller keeps ownership.
pub fn validate(raw: &RawSubmission) -> Result<ReleaseFields, Rejected> {
    let form = normalize(raw);
    let errors = check(&form);
    if !errors.is_empty() {
        return Err(Rejected { form, errors });
    }

    Ok(ReleaseFields {
        category: form.text(Field::Category).to_string(),
        title: form.text(Field::Title).to_string(),
        url: form.optional(Field::Url),
        producer: form.text(Field::Producer).to_string(),
        link_url: form.optional(Field::LinkUrl),
        media: form.list(Field::Media).to_vec(),
        date: form.text(Field::Date).to_string(),
        time: form.optional(Field::Time),
        movie_author: form.optional(Field::MovieAuthor),
        illust_author: form.optional(Field::IllustAuthor),
        vocaloid_chars: form.list(Field::VocaloidChars).to_vec(),
        twitter: form.optional(Field::Twitter),
        email: form.optional(Field::Email),
        description: form.optional(Field::Description),
    })
}
