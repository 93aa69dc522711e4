//! Structural events
//!
//! Every source format is turned into the same flat sequence of events:
//! container, table and row boundaries plus leaf cells. Filters never mutate
//! an event in place; the `with_*` methods consume an event and return the
//! transformed one.

use std::sync::Arc;

use crate::entry::ErrorEntry;
use crate::schema::{ColumnSpec, TableSpec};
use crate::value::Value;

/// Event variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StartContainer,
    EndContainer,
    StartTable,
    EndTable,
    StartRow,
    EndRow,
    Cell,
}

/// A structural event with the properties filters attach to it
#[derive(Debug, Clone)]
pub struct Event {
    /// Variant
    pub kind: EventKind,

    /// Table id, once identified (inherited by everything inside the table)
    pub table_name: Option<String>,

    /// Table spec, once identified
    pub table_spec: Option<Arc<TableSpec>>,

    /// Header row of a tabular `StartTable`
    pub headers: Option<Vec<String>>,

    /// Source header of a `Cell`
    pub header: Option<String>,

    /// Cell value (raw until conformed)
    pub value: Value,

    /// Column spec bound to a `Cell`
    pub column_spec: Option<Arc<ColumnSpec>>,

    /// At most one problem found while processing this event
    pub error: Option<ErrorEntry>,

    /// Zero-based data row index for row-addressable sources
    pub row_number: Option<usize>,
}

impl Event {
    fn new(kind: EventKind) -> Self {
        Self {
            kind,
            table_name: None,
            table_spec: None,
            headers: None,
            header: None,
            value: Value::Blank,
            column_spec: None,
            error: None,
            row_number: None,
        }
    }

    pub fn start_container() -> Self {
        Self::new(EventKind::StartContainer)
    }

    pub fn end_container() -> Self {
        Self::new(EventKind::EndContainer)
    }

    /// A table whose id is not yet known, described by its header row
    pub fn start_table(headers: Vec<String>) -> Self {
        let mut event = Self::new(EventKind::StartTable);
        event.headers = Some(headers);
        event
    }

    /// A table whose id is known from the source structure
    pub fn start_named_table(table_name: impl Into<String>) -> Self {
        let mut event = Self::new(EventKind::StartTable);
        event.table_name = Some(table_name.into());
        event
    }

    pub fn end_table() -> Self {
        Self::new(EventKind::EndTable)
    }

    pub fn start_row(row_number: Option<usize>) -> Self {
        let mut event = Self::new(EventKind::StartRow);
        event.row_number = row_number;
        event
    }

    pub fn end_row() -> Self {
        Self::new(EventKind::EndRow)
    }

    pub fn cell(header: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut event = Self::new(EventKind::Cell);
        event.header = Some(header.into());
        event.value = value.into();
        event
    }

    /// Set table properties
    pub fn with_table(mut self, table_name: Option<String>, table_spec: Option<Arc<TableSpec>>) -> Self {
        self.table_name = table_name;
        self.table_spec = table_spec;
        self
    }

    pub fn with_column_spec(mut self, column_spec: Arc<ColumnSpec>) -> Self {
        self.column_spec = Some(column_spec);
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    /// Attach an error, keeping the first one if the event already carries one
    pub fn with_error(mut self, error: ErrorEntry) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }

    pub fn with_row_number(mut self, row_number: usize) -> Self {
        self.row_number = Some(row_number);
        self
    }

    pub fn is(&self, kind: EventKind) -> bool {
        self.kind == kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ErrorKind;

    #[test]
    fn builders_return_new_events() {
        let cell = Event::cell("CHILD", "123");
        let tagged = cell.clone().with_table(Some("header".to_string()), None);

        assert!(cell.table_name.is_none());
        assert_eq!(tagged.table_name.as_deref(), Some("header"));
        assert_eq!(tagged.value, Value::text("123"));
    }

    #[test]
    fn first_error_wins() {
        let event = Event::cell("DOB", "")
            .with_error(ErrorEntry::new(ErrorKind::BlankNotAllowed, "first"))
            .with_error(ErrorEntry::new(ErrorKind::ConversionError, "second"));

        assert_eq!(event.error.map(|e| e.kind), Some(ErrorKind::BlankNotAllowed));
    }
}
