//! Submitted file metadata

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// A submitted file, with the metadata stamped onto its outputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path the file was read from
    pub path: PathBuf,

    /// File name (used in error entries)
    pub name: String,

    /// Per-file id (used in error entries)
    pub uuid: String,

    /// Hex-encoded SHA-256 of the contents
    pub sha256: String,

    /// Size in bytes
    pub size: u64,

    /// Last modification time, if the filesystem reports one
    pub modified: Option<chrono::DateTime<chrono::Utc>>,
}

impl SourceFile {
    /// Read metadata and hash the contents of a file on disk
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let bytes = std::fs::read(path)
            .map_err(|e| SourceError::IoError(path.display().to_string(), e.to_string()))?;
        let metadata = std::fs::metadata(path)
            .map_err(|e| SourceError::IoError(path.display().to_string(), e.to_string()))?;

        let mut source = Self::from_bytes(file_name(path), &bytes);
        source.path = path.to_path_buf();
        source.modified = metadata.modified().ok().map(chrono::DateTime::<chrono::Utc>::from);
        Ok(source)
    }

    /// Describe in-memory contents
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Self {
        let name = name.into();
        Self {
            path: PathBuf::from(&name),
            name,
            uuid: uuid::Uuid::new_v4().to_string(),
            sha256: hex::encode(Sha256::digest(bytes)),
            size: bytes.len() as u64,
            modified: None,
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Source file errors
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to read source file {0}: {1}")]
    IoError(String, String),
}
