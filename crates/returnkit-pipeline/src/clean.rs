//! Cleaning driver

use std::iter::Map;
use std::path::Path;

use returnkit_core::{Event, EventKind, SourceFile, TableLookup};

use crate::collector::{collect_with, Accumulator, CleanedFile, Collecting, CollectorHandle, TableCollector};
use crate::error::StreamError;
use crate::filters::{bind_column, conform_cell, log_blank, IdentifyTables, InheritMode, InheritProperties};
use crate::tabular::TabularEvents;

type Stage<I> = Map<I, fn(Event) -> Event>;

/// Chainable filter stages on any event stream
pub trait PipelineExt: Iterator<Item = Event> + Sized {
    fn identify_tables<L: TableLookup>(self, lookup: &L) -> IdentifyTables<'_, Self, L> {
        IdentifyTables::new(self, lookup)
    }

    fn inherit_properties(self, mode: InheritMode) -> InheritProperties<Self> {
        InheritProperties::new(self, mode)
    }

    fn bind_columns(self) -> Stage<Self> {
        self.map(bind_column as fn(Event) -> Event)
    }

    fn log_blanks(self) -> Stage<Self> {
        self.map(log_blank as fn(Event) -> Event)
    }

    fn conform_cells(self) -> Stage<Self> {
        self.map(conform_cell as fn(Event) -> Event)
    }

    /// Feed the stream to `accumulator`; read the handle after draining
    fn collect_into<A: Accumulator>(self, accumulator: A) -> (Collecting<Self, A>, CollectorHandle<A::Output>) {
        collect_with(self, accumulator)
    }
}

impl<I: Iterator<Item = Event>> PipelineExt for I {}

/// Run every cleaning stage over `events` and collect the result
///
/// Fails only when the stream holds no table at all.
pub fn clean_file<E, L>(events: E, lookup: &L, source: &SourceFile) -> Result<CleanedFile, StreamError>
where
    E: IntoIterator<Item = Event>,
    L: TableLookup,
{
    let (stream, handle) = events
        .into_iter()
        .identify_tables(lookup)
        .inherit_properties(InheritMode::Fill)
        .bind_columns()
        .log_blanks()
        .conform_cells()
        .collect_into(TableCollector::for_source(source));

    let tables = stream.filter(|e| e.is(EventKind::StartTable)).count();
    if tables == 0 {
        return Err(StreamError::NoTables(source.name.clone()));
    }

    let cleaned = handle.take()?;
    tracing::info!(
        file = %source.name,
        tables = cleaned.data.len(),
        rows = cleaned.data.row_count(),
        errors = cleaned.errors.len(),
        "cleaned file"
    );
    Ok(cleaned)
}

/// Open and clean a CSV file
pub fn clean_tabular_file<L: TableLookup>(path: &Path, lookup: &L) -> Result<(SourceFile, CleanedFile), StreamError> {
    let source = SourceFile::open(path)
        .map_err(|e| StreamError::IoError(path.display().to_string(), e.to_string()))?;
    let events = TabularEvents::open(path)?;
    let cleaned = clean_file(events, lookup, &source)?;
    Ok((source, cleaned))
}
