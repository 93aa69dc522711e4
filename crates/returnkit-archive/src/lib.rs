//! Snapshot archive and aggregation
//!
//! This crate handles:
//! - Period encoding for snapshot names
//! - Writing and reading typed tables as CSV
//! - Sort-then-deduplicate on unique keys
//! - The append-only `SnapshotArchive` and its combined "current" view
//! - The `Aggregator` for already-exported files

pub mod error;
pub mod period;
pub mod table_io;
pub mod dedup;
pub mod archive;
pub mod aggregator;

pub use error::ArchiveError;
pub use period::{Period, Term};
pub use table_io::{export_table, export_tables, read_table, write_new_table};
pub use dedup::{deduplicate, deduplicate_table};
pub use archive::{SnapshotArchive, SnapshotId};
pub use aggregator::Aggregator;
