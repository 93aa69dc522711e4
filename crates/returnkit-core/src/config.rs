//! Configuration schema (returnkit.toml)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// When the archive deduplicates while combining snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DedupMode {
    /// After every fold step
    #[serde(rename = "E")]
    Each,

    /// Once, after the final fold step
    #[default]
    #[serde(rename = "A")]
    AfterAll,

    /// Never
    #[serde(rename = "N")]
    Never,
}

impl DedupMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Each => "E",
            Self::AfterAll => "A",
            Self::Never => "N",
        }
    }
}

impl std::fmt::Display for DedupMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DedupMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "E" => Ok(Self::Each),
            "A" => Ok(Self::AfterAll),
            "N" => Ok(Self::Never),
            other => Err(ConfigError::ParseError(format!(
                "unknown dedup mode '{}' (expected E, A or N)",
                other
            ))),
        }
    }
}

/// Shape of the submitted files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// CSV/spreadsheet rows; errors carry row numbers
    #[default]
    Tabular,

    /// XML documents; rows are not addressable
    Xml,
}

/// A local authority that may submit files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// Short code used in archive paths
    pub code: String,

    /// Names that identify the authority in file paths
    #[serde(default)]
    pub names: Vec<String>,
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Dataset id (prefix of schema files)
    #[serde(default = "default_dataset")]
    pub dataset: String,

    /// Directory holding base schemas and diffs
    #[serde(default = "default_schema_dir")]
    pub schema_dir: PathBuf,

    /// Root of the snapshot archive
    #[serde(default = "default_archive_root")]
    pub archive_root: PathBuf,

    /// Deduplication mode for combined views
    #[serde(default)]
    pub dedup_mode: DedupMode,

    /// Shape of submitted files
    #[serde(default)]
    pub source_format: SourceFormat,

    /// Export profile applied to combined views
    #[serde(default)]
    pub export_profile: Option<String>,

    /// `tracing` filter used when RUST_LOG is unset
    #[serde(default)]
    pub log_filter: Option<String>,

    /// Files to skip (glob patterns on the file name)
    #[serde(default)]
    pub ignore_files: Vec<String>,

    /// Known authorities
    #[serde(default)]
    pub authorities: Vec<AuthorityConfig>,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

fn default_dataset() -> String {
    "ssda903".to_string()
}

fn default_schema_dir() -> PathBuf {
    PathBuf::from("schemas")
}

fn default_archive_root() -> PathBuf {
    PathBuf::from("archive")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset: default_dataset(),
            schema_dir: default_schema_dir(),
            archive_root: default_archive_root(),
            dedup_mode: DedupMode::default(),
            source_format: SourceFormat::default(),
            export_profile: None,
            log_filter: None,
            ignore_files: Vec::new(),
            authorities: Vec::new(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Resolve a configured path against the project root
    pub fn resolve(&self, path: &std::path::Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    /// Check if a file should be skipped
    pub fn is_file_ignored(&self, file_name: &str) -> bool {
        self.ignore_files.iter().any(|pattern| glob_match(pattern, file_name))
    }
}

/// Simple glob matching (supports a single * wildcard)
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" || pattern == "**" {
        return true;
    }

    if let Some(star_pos) = pattern.find('*') {
        let prefix = &pattern[..star_pos];
        let suffix = &pattern[star_pos + 1..];

        text.len() >= prefix.len() + suffix.len() && text.starts_with(prefix) && text.ends_with(suffix)
    } else {
        pattern == text
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
