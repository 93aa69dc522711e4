//! Year-versioned schema catalog
//!
//! This crate handles:
//! - Parsing base schema documents and yearly diff documents (YAML)
//! - Applying diffs to produce the schema of any year
//! - Resolving the result into immutable table and column specs

pub mod error;
pub mod document;
pub mod diff;
pub mod catalog;

pub use error::SchemaError;
pub use document::{CategoryDefinition, ColumnDefinition, DiffEntry, DiffOp, SchemaDiff, SchemaDocument};
pub use diff::{apply_diff, apply_entry};
pub use catalog::{resolve_tables, SchemaCatalog, SchemaFiles};
