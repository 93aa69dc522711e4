//! Per-file stream errors
//!
//! These are the only failures that abort a file. Everything found inside a
//! readable file is reported as an `ErrorEntry` instead.

use returnkit_core::{ErrorEntry, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("Failed to open {0}: {1}")]
    IoError(String, String),

    #[error("{0} is empty")]
    Empty(String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),

    #[error("No tables found in {0}")]
    NoTables(String),

    #[error("Collector read before its stream was drained")]
    NotDrained,
}

impl StreamError {
    /// Report entry for a file that produced no output
    pub fn to_entry(&self, filename: &str) -> ErrorEntry {
        ErrorEntry::new(ErrorKind::StreamError, self.to_string()).with_filename(filename)
    }
}
