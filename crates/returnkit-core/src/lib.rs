//! ReturnKit Core
//!
//! Core domain model shared by every stage: values, stream events, column and
//! table specifications, typed tables and the error model.
//! Never rename error codes - they are part of the public report format.

pub mod value;
pub mod event;
pub mod entry;
pub mod schema;
pub mod data;
pub mod report;
pub mod config;
pub mod source;
pub mod discovery;

pub use value::{Value, STORED_DATE_FORMAT};
pub use event::{Event, EventKind};
pub use entry::{ErrorEntry, ErrorKind, ErrorContainer};
pub use schema::{
    full_match_regex, CategoryCandidate, ColumnSpec, ColumnType, NumericKind, NumericSpec, SortKey,
    StringKind, TableLookup, TableSpec,
};
pub use data::{DataContainer, Record, Table};
pub use report::{ErrorReport, ReportSummary, ReportVersion};
pub use config::{AuthorityConfig, Config, ConfigError, DedupMode, SourceFormat};
pub use source::{SourceError, SourceFile};
pub use discovery::{find_authority, find_year, DiscoveryError};
