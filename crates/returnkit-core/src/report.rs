//! Session error report (stable v1)
//!
//! Every error produced during a processing session is flattened into one
//! report. The CSV layout is STABLE; breaking changes require a new version.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::entry::{ErrorContainer, ErrorEntry, ErrorKind};

/// Column order of the CSV error report
pub const REPORT_COLUMNS: [&str; 7] = [
    "type",
    "message",
    "filename",
    "uuid",
    "row_number",
    "table_name",
    "session_id",
];

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Summary statistics for a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Total number of entries
    pub total: usize,

    /// Entries per error code
    pub by_kind: BTreeMap<ErrorKind, usize>,

    /// Number of files that contributed entries
    pub files: usize,
}

/// All errors of one processing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Schema version
    pub version: ReportVersion,

    /// Session id attached to every row
    pub session_id: String,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    /// Summary statistics
    pub summary: ReportSummary,

    /// All entries, in the order they were produced
    pub entries: Vec<ErrorEntry>,
}

impl ErrorReport {
    /// Create an empty report for a new session
    pub fn new() -> Self {
        Self::with_session_id(uuid::Uuid::new_v4().to_string())
    }

    /// Create an empty report for a known session
    pub fn with_session_id(session_id: impl Into<String>) -> Self {
        Self {
            version: ReportVersion::CURRENT,
            session_id: session_id.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            summary: ReportSummary::default(),
            entries: Vec::new(),
        }
    }

    /// Add a single entry
    pub fn add_entry(&mut self, entry: ErrorEntry) {
        self.summary.total += 1;
        *self.summary.by_kind.entry(entry.kind).or_insert(0) += 1;
        self.entries.push(entry);
        self.summary.files = self.count_files();
    }

    /// Add every entry of a container
    pub fn add_errors(&mut self, errors: ErrorContainer) {
        for entry in errors {
            self.add_entry(entry);
        }
    }

    fn count_files(&self) -> usize {
        let mut files: Vec<&str> = self
            .entries
            .iter()
            .filter_map(|e| e.filename.as_deref())
            .collect();
        files.sort_unstable();
        files.dedup();
        files.len()
    }

    /// Check if the report has any entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the flat CSV report
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(REPORT_COLUMNS)?;

        for entry in &self.entries {
            let row_number = entry.row_number.map(|n| n.to_string()).unwrap_or_default();
            csv.write_record([
                entry.kind.as_str(),
                entry.message.as_str(),
                entry.filename.as_deref().unwrap_or(""),
                entry.uuid.as_deref().unwrap_or(""),
                row_number.as_str(),
                entry.table_id.as_deref().unwrap_or(""),
                self.session_id.as_str(),
            ])?;
        }

        csv.flush()?;
        Ok(())
    }

    /// Save the CSV report to a file
    pub fn save_csv(&self, path: &Path) -> Result<(), csv::Error> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file)
    }
}

impl Default for ErrorReport {
    fn default() -> Self {
        Self::new()
    }
}
