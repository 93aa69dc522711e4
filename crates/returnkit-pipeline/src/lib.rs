//! Streaming cleaning pipeline
//!
//! This crate implements:
//! - Source adapters producing `Event` streams (CSV, element nodes)
//! - The filter stages (table identification, property inheritance,
//!   column binding, blank logging, conformance)
//! - Collectors that turn a drained stream into typed tables and errors
//! - The `clean_file` driver wiring all of the above

pub mod error;
pub mod conform;
pub mod filters;
pub mod collector;
pub mod tabular;
pub mod nodes;
pub mod clean;

pub use error::StreamError;
pub use conform::{conform, ConformError};
pub use filters::{
    bind_column, conform_cell, identify_table, log_blank, IdentifyTables, InheritMode, InheritProperties,
};
pub use collector::{
    collect_with, Accumulator, CleanedFile, Collecting, CollectorHandle, TableCollector, HEADER_ROW_OFFSET,
};
pub use tabular::TabularEvents;
pub use nodes::{NodeEvent, NodeEvents};
pub use clean::{clean_file, clean_tabular_file, PipelineExt};
