//! Append-only record ledger
//!
//! One CSV row per committed submission, columns in the fixed order of
//! [`COLUMNS`]. Rows are transcoded to the deployment's ledger encoding
//! (Shift_JIS unless configured otherwise) before they touch the file.

use crate::record::{Field, SubmissionRecord};
use crate::{Error, Result};
use encoding_rs::Encoding;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Version of the column layout in [`COLUMNS`]
///
/// Version 1 had no `image` column.
pub const SCHEMA_VERSION: u32 = 2;

/// A ledger column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Sequence,
    Stamp,
    Field(Field),
    /// `1` when an upload is attached, `0` otherwise
    Image,
}

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Column::Sequence => "seq",
            Column::Stamp => "stamp",
            Column::Field(field) => field.as_str(),
            Column::Image => "image",
        }
    }

    /// Text written for this column of `record`
    pub fn value(&self, record: &SubmissionRecord) -> String {
        match self {
            Column::Sequence => record.sequence.to_string(),
            Column::Stamp => record.timestamp.clone(),
            Column::Field(field) => record.fields.value(*field),
            Column::Image => if record.upload_attached() { "1" } else { "0" }.to_string(),
        }
    }
}

/// Column order of schema version 2
pub const COLUMNS: [Column; 17] = [
    Column::Sequence,
    Column::Stamp,
    Column::Field(Field::Category),
    Column::Field(Field::Title),
    Column::Field(Field::Url),
    Column::Field(Field::Producer),
    Column::Field(Field::LinkUrl),
    Column::Field(Field::Media),
    Column::Field(Field::Date),
    Column::Field(Field::Time),
    Column::Field(Field::MovieAuthor),
    Column::Field(Field::IllustAuthor),
    Column::Field(Field::VocaloidChars),
    Column::Field(Field::Twitter),
    Column::Field(Field::Email),
    Column::Image,
    Column::Field(Field::Description),
];

/// Resolve a WHATWG encoding label such as `shift_jis` or `utf-8`
pub fn encoding_for_label(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| Error::Config(format!("Unknown ledger encoding: {}", label)))
}

/// One decoded ledger row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub values: Vec<String>,
}

impl LedgerRow {
    pub fn get(&self, column: Column) -> Option<&str> {
        let index = COLUMNS.iter().position(|c| *c == column)?;
        self.values.get(index).map(String::as_str)
    }

    pub fn sequence(&self) -> Option<u64> {
        self.get(Column::Sequence)?.trim().parse().ok()
    }

    /// Column name/value pairs; values beyond the schema are dropped
    pub fn pairs(&self) -> impl Iterator<Item = (&'static str, &str)> {
        COLUMNS
            .iter()
            .zip(self.values.iter())
            .map(|(column, value)| (column.name(), value.as_str()))
    }
}

/// True for an empty file or one whose last byte is `\n`
fn ends_with_newline(file: &mut fs::File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Append-only CSV store of committed records
#[derive(Debug, Clone)]
pub struct RecordLedger {
    path: PathBuf,
    encoding: &'static Encoding,
}

impl RecordLedger {
    pub fn new(path: impl Into<PathBuf>, encoding: &'static Encoding) -> Self {
        Self {
            path: path.into(),
            encoding,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Serialize `record` into one complete, transcoded row
    pub fn encode_row(&self, record: &SubmissionRecord) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer.write_record(COLUMNS.iter().map(|c| c.value(record)))?;
        let utf8 = writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?;
        let text = String::from_utf8(utf8)
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;

        let (bytes, _, had_errors) = self.encoding.encode(&text);
        if had_errors {
            return Err(Error::Transcode {
                sequence: record.sequence,
                encoding: self.encoding.name(),
            });
        }
        Ok(bytes.into_owned())
    }

    /// Append one row for `record`
    ///
    /// The row is fully built before the file is opened and lands with a
    /// single append-mode write, so a failed transcode leaves the ledger
    /// untouched. A final row left unterminated by an interrupted write is
    /// closed with a newline first.
    pub fn append(&self, record: &SubmissionRecord) -> Result<()> {
        let row = self.encode_row(record)?;
        let sequence = record.sequence;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| Error::LedgerAppend { sequence, source })?;

        let mut buf = Vec::with_capacity(row.len() + 1);
        let terminated = ends_with_newline(&mut file)
            .map_err(|source| Error::LedgerAppend { sequence, source })?;
        if !terminated {
            warn!(sequence, "Ledger ends mid-row, terminating it before append");
            buf.push(b'\n');
        }
        buf.extend_from_slice(&row);

        file.write_all(&buf)
            .and_then(|_| file.sync_data())
            .map_err(|source| Error::LedgerAppend { sequence, source })?;

        debug!(sequence, bytes = buf.len(), "Appended ledger row");
        Ok(())
    }

    /// Decode the whole ledger; an absent file is an empty ledger
    pub fn read_all(&self) -> Result<Vec<LedgerRow>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let (text, had_errors) = self.encoding.decode_without_bom_handling(&bytes);
        if had_errors {
            warn!(
                "Ledger {} contains bytes invalid in {}",
                self.path.display(),
                self.encoding.name()
            );
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());
        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            rows.push(LedgerRow {
                values: record.iter().map(str::to_owned).collect(),
            });
        }
        Ok(rows)
    }

    /// Highest sequence number present in the ledger (0 when empty)
    pub fn last_sequence(&self) -> Result<u64> {
        let mut last = 0;
        for (index, row) in self.read_all()?.iter().enumerate() {
            match row.sequence() {
                Some(seq) => last = last.max(seq),
                None => warn!(row = index + 1, "Ledger row without a sequence number"),
            }
        }
        Ok(last)
    }
}
