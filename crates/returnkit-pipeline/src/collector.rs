//! Stream collectors
//!
//! A collector passes every event through unchanged while feeding it to an
//! `Accumulator`. The accumulated output is published to a `CollectorHandle`
//! when the wrapped stream ends, so the handle only yields a result after
//! something downstream has drained the stream.

use std::cell::RefCell;
use std::rc::Rc;

use returnkit_core::{
    DataContainer, ErrorContainer, ErrorEntry, Event, EventKind, Record, SourceFile, Table, Value,
};

use crate::error::StreamError;

/// Rows of a tabular source start after the header row, and are reported 1-based
pub const HEADER_ROW_OFFSET: usize = 2;

/// State fed with every event of a stream
pub trait Accumulator {
    type Output;

    /// Observe one event
    fn accept(&mut self, event: &Event);

    /// Produce the result once the stream has ended
    fn finish(self) -> Self::Output;
}

/// Read side of a collector
#[derive(Debug)]
pub struct CollectorHandle<T> {
    slot: Rc<RefCell<Option<T>>>,
}

impl<T> CollectorHandle<T> {
    /// Whether the stream has been drained
    pub fn is_ready(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Take the result; fails if the stream has not been drained
    pub fn take(&self) -> Result<T, StreamError> {
        self.slot.borrow_mut().take().ok_or(StreamError::NotDrained)
    }
}

/// Pass-through iterator that feeds an accumulator
pub struct Collecting<I, A: Accumulator> {
    inner: I,
    accumulator: Option<A>,
    slot: Rc<RefCell<Option<A::Output>>>,
}

impl<I, A> Iterator for Collecting<I, A>
where
    I: Iterator<Item = Event>,
    A: Accumulator,
{
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        match self.inner.next() {
            Some(event) => {
                if let Some(accumulator) = self.accumulator.as_mut() {
                    accumulator.accept(&event);
                }
                Some(event)
            }
            None => {
                if let Some(accumulator) = self.accumulator.take() {
                    *self.slot.borrow_mut() = Some(accumulator.finish());
                }
                None
            }
        }
    }
}

/// Wrap `events` so that `accumulator` sees every event
pub fn collect_with<I, A>(events: I, accumulator: A) -> (Collecting<I, A>, CollectorHandle<A::Output>)
where
    I: Iterator<Item = Event>,
    A: Accumulator,
{
    let slot = Rc::new(RefCell::new(None));
    let handle = CollectorHandle { slot: Rc::clone(&slot) };
    let stream = Collecting {
        inner: events,
        accumulator: Some(accumulator),
        slot,
    };
    (stream, handle)
}

/// Typed tables and errors produced from one file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanedFile {
    pub data: DataContainer,
    pub errors: ErrorContainer,
}

#[derive(Debug)]
struct OpenTable {
    id: String,
    table: Table,
    addressable: bool,
}

/// Stage 6: accumulate bound cells into rows, rows into tables, and every
/// attached error into a flat list
#[derive(Debug, Default)]
pub struct TableCollector {
    filename: Option<String>,
    uuid: Option<String>,
    output: CleanedFile,
    table: Option<OpenTable>,
    row: Option<Record>,
    row_number: Option<usize>,
}

impl TableCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp errors with the file they came from
    pub fn for_source(source: &SourceFile) -> Self {
        Self {
            filename: Some(source.name.clone()),
            uuid: Some(source.uuid.clone()),
            ..Self::default()
        }
    }

    fn decorate(&self, event: &Event, entry: ErrorEntry) -> ErrorEntry {
        let mut entry = entry;
        if entry.filename.is_none() {
            if let Some(filename) = &self.filename {
                entry = entry.with_filename(filename.clone());
            }
        }
        if entry.uuid.is_none() {
            if let Some(uuid) = &self.uuid {
                entry = entry.with_uuid(uuid.clone());
            }
        }
        if entry.row_number.is_none() {
            if let Some(index) = self.row_number.or(event.row_number) {
                entry = entry.with_row_number(index + HEADER_ROW_OFFSET);
            }
        }
        if entry.header.is_none() {
            if let Some(header) = &event.header {
                entry = entry.with_header(header.clone());
            }
        }
        if entry.table_id.is_none() {
            if let Some(table) = &event.table_name {
                entry = entry.with_table(table.clone());
            }
        }
        entry
    }

    fn close_table(&mut self) {
        let Some(open) = self.table.take() else {
            return;
        };

        let table = open.table.with_row_addressable(open.addressable);
        tracing::debug!(table = %open.id, rows = table.len(), "collected table");

        let mut single = DataContainer::new();
        single.insert(open.id, table);
        self.output.data.merge(single);
    }
}

impl Accumulator for TableCollector {
    type Output = CleanedFile;

    fn accept(&mut self, event: &Event) {
        if let Some(entry) = &event.error {
            let entry = self.decorate(event, entry.clone());
            self.output.errors.push(entry);
        }

        match event.kind {
            EventKind::StartTable => {
                self.close_table();
                if let (Some(id), Some(spec)) = (&event.table_name, &event.table_spec) {
                    self.table = Some(OpenTable {
                        id: id.clone(),
                        table: Table::new(spec.column_ids()),
                        addressable: true,
                    });
                }
            }
            EventKind::EndTable => self.close_table(),
            EventKind::StartRow => {
                self.row = Some(Record::new());
                self.row_number = event.row_number;
            }
            EventKind::Cell => {
                if let (Some(row), Some(column)) = (self.row.as_mut(), &event.column_spec) {
                    row.insert(column.id.clone(), event.value.clone());
                }
            }
            EventKind::EndRow => {
                let row = self.row.take();
                if let (Some(mut row), Some(open)) = (row, self.table.as_mut()) {
                    for column in &open.table.columns {
                        row.entry(column.clone()).or_insert(Value::Blank);
                    }
                    open.addressable &= self.row_number.is_some();
                    open.table.rows.push(row);
                }
                self.row_number = None;
            }
            EventKind::StartContainer | EventKind::EndContainer => {}
        }
    }

    fn finish(mut self) -> CleanedFile {
        self.close_table();
        self.output
    }
}
