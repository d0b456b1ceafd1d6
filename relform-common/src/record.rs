//! Submission data model
//!
//! A [`SubmissionRecord`] is created only inside the commit critical section,
//! once a sequence number and timestamp have been assigned. Before that the
//! submission exists as [`ReleaseFields`], the validated form values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator used when list-valued fields are flattened into one column
pub const LIST_DELIMITER: &str = "//";

/// Timestamp format of the `stamp` column
pub const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Named form fields
///
/// `as_str` is the key used by the HTML form (`relinfo[<key>]`) and the
/// column header used in notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Category,
    Title,
    Url,
    Producer,
    LinkUrl,
    Media,
    Date,
    Time,
    MovieAuthor,
    IllustAuthor,
    VocaloidChars,
    Twitter,
    Email,
    Description,
}

impl Field {
    pub const ALL: [Field; 14] = [
        Field::Category,
        Field::Title,
        Field::Url,
        Field::Producer,
        Field::LinkUrl,
        Field::Media,
        Field::Date,
        Field::Time,
        Field::MovieAuthor,
        Field::IllustAuthor,
        Field::VocaloidChars,
        Field::Twitter,
        Field::Email,
        Field::Description,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Category => "type",
            Field::Title => "title",
            Field::Url => "url",
            Field::Producer => "producer",
            Field::LinkUrl => "linkurl",
            Field::Media => "media",
            Field::Date => "date",
            Field::Time => "time",
            Field::MovieAuthor => "movie_author",
            Field::IllustAuthor => "illust_author",
            Field::VocaloidChars => "vocaloid_chars",
            Field::Twitter => "twitter",
            Field::Email => "email",
            Field::Description => "description",
        }
    }

    /// Look up a field by its form key
    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL.iter().copied().find(|f| f.as_str() == key)
    }

    /// Whether the field holds a list of selected values
    pub fn is_list(&self) -> bool {
        matches!(self, Field::Media | Field::VocaloidChars)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated release attributes
///
/// Required fields are plain `String`/`Vec`, guaranteed non-blank by the
/// validator. Optional fields are `None` when left blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseFields {
    pub category: String,
    pub title: String,
    pub url: Option<String>,
    pub producer: String,
    pub link_url: Option<String>,
    pub media: Vec<String>,
    pub date: String,
    pub time: Option<String>,
    pub movie_author: Option<String>,
    pub illust_author: Option<String>,
    pub vocaloid_chars: Vec<String>,
    pub twitter: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
}

impl ReleaseFields {
    /// Text value of a field as written to the ledger
    ///
    /// Lists are joined with [`LIST_DELIMITER`]; absent optionals are empty.
    pub fn value(&self, field: Field) -> String {
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        match field {
            Field::Category => self.category.clone(),
            Field::Title => self.title.clone(),
            Field::Url => opt(&self.url),
            Field::Producer => self.producer.clone(),
            Field::LinkUrl => opt(&self.link_url),
            Field::Media => self.media.join(LIST_DELIMITER),
            Field::Date => self.date.clone(),
            Field::Time => opt(&self.time),
            Field::MovieAuthor => opt(&self.movie_author),
            Field::IllustAuthor => opt(&self.illust_author),
            Field::VocaloidChars => self.vocaloid_chars.join(LIST_DELIMITER),
            Field::Twitter => opt(&self.twitter),
            Field::Email => opt(&self.email),
            Field::Description => opt(&self.description),
        }
    }
}

/// Relocated upload, named after the record's sequence number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRef {
    /// File name inside the images directory, e.g. `0007.png`
    pub file_name: String,
}

/// One committed submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub sequence: u64,
    pub timestamp: String,
    pub fields: ReleaseFields,
    pub upload: Option<UploadRef>,
}

impl SubmissionRecord {
    pub fn upload_attached(&self) -> bool {
        self.upload.is_some()
    }
}
