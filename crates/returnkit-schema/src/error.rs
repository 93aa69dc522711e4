//! Schema errors

/// Errors raised while loading, patching or querying a schema
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Failed to read schema file {0}: {1}")]
    IoError(String, String),

    #[error("Failed to parse schema file {0}: {1}")]
    ParseError(String, String),

    #[error("No base schema for dataset '{dataset}' at or before {year}")]
    MissingBase { dataset: String, year: u16 },

    #[error("Diff {file}: path '{path}' does not exist")]
    InvalidPath { file: String, path: String },

    #[error("Diff {file}: entry '{path}' is malformed: {reason}")]
    InvalidDiff { file: String, path: String, reason: String },

    #[error("Column {table}.{column} is invalid: {reason}")]
    InvalidColumn { table: String, column: String, reason: String },

    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    #[error("Unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },
}
