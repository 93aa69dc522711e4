//! Tabular (CSV) adapter
//!
//! Produces `StartContainer, StartTable(headers), (StartRow, Cell*, EndRow)*,
//! EndTable, EndContainer`. Rows are numbered from 0 in data order; rows whose
//! cells are all blank are skipped but still counted.

use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use returnkit_core::{ErrorEntry, ErrorKind, Event};

use crate::error::StreamError;

/// Lazy event stream over one CSV source
pub struct TabularEvents<R: Read> {
    records: csv::ByteRecordsIntoIter<R>,
    headers: Vec<String>,
    pending: VecDeque<Event>,
    next_row: usize,
    finished: bool,
    name: String,
}

impl TabularEvents<File> {
    /// Open a CSV file
    pub fn open(path: &Path) -> Result<Self, StreamError> {
        let file = File::open(path)
            .map_err(|e| StreamError::IoError(path.display().to_string(), e.to_string()))?;
        Self::from_reader(file, &path.display().to_string())
    }
}

impl<R: Read> TabularEvents<R> {
    /// Read the header row eagerly; data rows are read as the stream is pulled
    pub fn from_reader(reader: R, name: &str) -> Result<Self, StreamError> {
        let mut csv = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(true)
            .from_reader(reader);

        let headers: Vec<String> = csv
            .byte_headers()
            .map_err(|e| StreamError::ParseError(name.to_string(), e.to_string()))?
            .iter()
            .map(|h| String::from_utf8_lossy(h).trim_start_matches('\u{feff}').to_string())
            .collect();

        if headers.is_empty() {
            return Err(StreamError::Empty(name.to_string()));
        }

        let mut pending = VecDeque::new();
        pending.push_back(Event::start_container());
        pending.push_back(Event::start_table(headers.clone()));

        Ok(Self {
            records: csv.into_byte_records(),
            headers,
            pending,
            next_row: 0,
            finished: false,
            name: name.to_string(),
        })
    }

    fn finish(&mut self, error: Option<ErrorEntry>) {
        let end = Event::end_table();
        self.pending.push_back(match error {
            Some(entry) => end.with_error(entry),
            None => end,
        });
        self.pending.push_back(Event::end_container());
        self.finished = true;
    }

    fn read_row(&mut self) {
        match self.records.next() {
            None => self.finish(None),
            Some(Err(e)) => {
                tracing::warn!(file = %self.name, error = %e, "stopped reading malformed CSV");
                let entry = ErrorEntry::new(ErrorKind::StreamError, format!("Unreadable row: {}", e));
                self.finish(Some(entry));
            }
            Some(Ok(record)) => {
                let row_number = self.next_row;
                self.next_row += 1;

                let cells: Vec<String> = record.iter().map(|c| String::from_utf8_lossy(c).into_owned()).collect();
                if cells.iter().all(|c| c.trim().is_empty()) {
                    return;
                }

                self.pending.push_back(Event::start_row(Some(row_number)));
                for (index, header) in self.headers.iter().enumerate() {
                    let value = cells.get(index).cloned().unwrap_or_default();
                    self.pending.push_back(Event::cell(header.clone(), value));
                }
                self.pending.push_back(Event::end_row());
            }
        }
    }
}

impl<R: Read> Iterator for TabularEvents<R> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.finished {
                return None;
            }
            self.read_row();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use returnkit_core::{EventKind, Value};

    fn kinds(events: &[Event]) -> Vec<EventKind> {
        events.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn emits_table_structure() {
        let data = "CHILD,DOB\n1,01/01/2015\n2,\n";
        let events: Vec<Event> = TabularEvents::from_reader(data.as_bytes(), "header.csv").unwrap().collect();

        use EventKind::*;
        assert_eq!(
            kinds(&events),
            vec![
                StartContainer, StartTable, StartRow, Cell, Cell, EndRow, StartRow, Cell, Cell, EndRow, EndTable,
                EndContainer,
            ]
        );
        assert_eq!(events[1].headers.as_deref(), Some(&["CHILD".to_string(), "DOB".to_string()][..]));
        assert_eq!(events[6].row_number, Some(1));
        assert_eq!(events[8].value, Value::text(""));
    }

    #[test]
    fn skips_blank_rows_but_counts_them() {
        let data = "CHILD\n1\n,\n\" \"\n3\n";
        let events: Vec<Event> = TabularEvents::from_reader(data.as_bytes(), "x.csv").unwrap().collect();
        let rows: Vec<Option<usize>> = events
            .iter()
            .filter(|e| e.is(EventKind::StartRow))
            .map(|e| e.row_number)
            .collect();
        assert_eq!(rows, vec![Some(0), Some(3)]);
    }

    #[test]
    fn empty_input_is_an_error() {
        let result = TabularEvents::from_reader("".as_bytes(), "empty.csv");
        assert!(matches!(result, Err(StreamError::Empty(name)) if name == "empty.csv"));
    }
}
