//! Archive errors

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("IO error on {0}: {1}")]
    IoError(String, String),

    #[error("CSV error in {0}: {1}")]
    CsvError(String, String),

    #[error("Invalid period '{0}': {1}")]
    InvalidPeriod(String, String),

    #[error("Invalid snapshot name '{0}'")]
    InvalidSnapshot(String),

    #[error("Snapshot file already exists: {0}")]
    SnapshotExists(String),
}

impl ArchiveError {
    pub(crate) fn io(path: &std::path::Path, e: impl std::fmt::Display) -> Self {
        Self::IoError(path.display().to_string(), e.to_string())
    }

    pub(crate) fn csv(path: &std::path::Path, e: impl std::fmt::Display) -> Self {
        Self::CsvError(path.display().to_string(), e.to_string())
    }
}
