//! Error entries and error codes
//!
//! IMPORTANT: Error codes are versioned and stable.
//! They are written to every error report, so NEVER rename or remove a code.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Error code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed or missing schema/diff document
    SchemaError,

    /// A cell failed type coercion
    ConversionError,

    /// An empty cell in a column that requires a value
    BlankNotAllowed,

    /// Header row matched no table, or more than one
    UnidentifiedTable,

    /// Header row is entirely blank
    BlankHeaders,

    /// A row was dropped by deduplication
    DuplicateRemoval,

    /// No reporting year could be found for a file
    MissingYear,

    /// No local authority could be found for a file
    MissingAuthority,

    /// A file could not be read or parsed at all
    StreamError,
}

impl ErrorKind {
    /// Get the error code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaError => "SCHEMA_ERROR",
            Self::ConversionError => "CONVERSION_ERROR",
            Self::BlankNotAllowed => "BLANK_NOT_ALLOWED",
            Self::UnidentifiedTable => "UNIDENTIFIED_TABLE",
            Self::BlankHeaders => "BLANK_HEADERS",
            Self::DuplicateRemoval => "DUPLICATE_REMOVAL",
            Self::MissingYear => "MISSING_YEAR",
            Self::MissingAuthority => "MISSING_AUTHORITY",
            Self::StreamError => "STREAM_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recoverable problem found while processing a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Stable error code
    #[serde(rename = "type")]
    pub kind: ErrorKind,

    /// Human-readable message
    pub message: String,

    /// Name of the file that produced the error
    pub filename: Option<String>,

    /// Id of the file that produced the error
    pub uuid: Option<String>,

    /// 1-based row number, for row-addressable sources
    pub row_number: Option<usize>,

    /// Source header of the offending cell
    pub header: Option<String>,

    /// Table id
    #[serde(rename = "table_name")]
    pub table_id: Option<String>,
}

impl ErrorEntry {
    /// Create a new entry with minimal fields
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            filename: None,
            uuid: None,
            row_number: None,
            header: None,
            table_id: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_row_number(mut self, row_number: usize) -> Self {
        self.row_number = Some(row_number);
        self
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn with_table(mut self, table_id: impl Into<String>) -> Self {
        self.table_id = Some(table_id.into());
        self
    }
}

/// Flat, ordered list of error entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorContainer {
    entries: Vec<ErrorEntry>,
}

impl ErrorContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ErrorEntry) {
        self.entries.push(entry);
    }

    /// Append every entry of `other`
    pub fn extend(&mut self, other: ErrorContainer) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ErrorEntry> {
        self.entries.iter()
    }

    /// Number of entries of one kind
    pub fn count(&self, kind: ErrorKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    pub fn into_vec(self) -> Vec<ErrorEntry> {
        self.entries
    }
}

impl From<Vec<ErrorEntry>> for ErrorContainer {
    fn from(entries: Vec<ErrorEntry>) -> Self {
        Self { entries }
    }
}

impl IntoIterator for ErrorContainer {
    type Item = ErrorEntry;
    type IntoIter = std::vec::IntoIter<ErrorEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a ErrorContainer {
    type Item = &'a ErrorEntry;
    type IntoIter = std::slice::Iter<'a, ErrorEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
