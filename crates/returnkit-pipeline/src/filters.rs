//! Cleaning filter stages
//!
//! Each stage is a pure stream-to-stream transform over `Event`s. Stages run
//! in this order:
//!
//! 1. `IdentifyTables` - resolve a `StartTable`'s header row to a table spec
//! 2. `InheritProperties` - copy table properties down to every event in the table
//! 3. `bind_column` - attach the column spec for a cell's header
//! 4. `log_blank` - flag blanks in columns that require a value
//! 5. `conform_cell` - coerce the cell to its column type

use std::sync::Arc;

use returnkit_core::{ErrorEntry, ErrorKind, Event, EventKind, TableLookup, TableSpec, Value};

use crate::conform::conform;

/// How inherited table properties treat properties an event already has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InheritMode {
    /// Only fill properties the event does not define
    #[default]
    Fill,

    /// Always replace with the table's properties
    Override,
}

/// Stage 1: resolve each `StartTable` to a table spec
pub struct IdentifyTables<'a, I, L> {
    inner: I,
    lookup: &'a L,
}

impl<'a, I, L> IdentifyTables<'a, I, L> {
    pub fn new(inner: I, lookup: &'a L) -> Self {
        Self { inner, lookup }
    }
}

impl<'a, I, L> Iterator for IdentifyTables<'a, I, L>
where
    I: Iterator<Item = Event>,
    L: TableLookup,
{
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        let event = self.inner.next()?;
        if !event.is(EventKind::StartTable) || event.table_spec.is_some() {
            return Some(event);
        }
        Some(identify_table(event, self.lookup))
    }
}

/// Attach the table spec a `StartTable` refers to, or an identification error
pub fn identify_table(event: Event, lookup: &impl TableLookup) -> Event {
    // Tables named by the source structure only need their spec
    if let Some(name) = event.table_name.clone() {
        return match lookup.table_spec(&name) {
            Some(spec) => event.with_table(Some(name), Some(Arc::clone(spec))),
            None => {
                let message = format!("Table '{}' is not in the schema", name);
                event
                    .with_table(None, None)
                    .with_error(ErrorEntry::new(ErrorKind::UnidentifiedTable, message))
            }
        };
    }

    let headers = event.headers.clone().unwrap_or_default();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return event.with_error(ErrorEntry::new(ErrorKind::BlankHeaders, "Header row is blank"));
    }

    let matches: Vec<&Arc<TableSpec>> = lookup
        .table_specs()
        .into_iter()
        .filter(|spec| spec.matches_headers(&headers))
        .collect();

    match matches.as_slice() {
        [spec] => {
            tracing::debug!(table = %spec.id, "identified table from headers");
            event.with_table(Some(spec.id.clone()), Some(Arc::clone(spec)))
        }
        [] => event.with_error(ErrorEntry::new(
            ErrorKind::UnidentifiedTable,
            format!("Headers [{}] match no table", headers.join(", ")),
        )),
        several => {
            let ids: Vec<&str> = several.iter().map(|s| s.id.as_str()).collect();
            event.with_error(ErrorEntry::new(
                ErrorKind::UnidentifiedTable,
                format!("Headers [{}] match several tables: {}", headers.join(", "), ids.join(", ")),
            ))
        }
    }
}

/// Stage 2: copy `table_name`/`table_spec` from a `StartTable` onto every
/// event up to, not including, its `EndTable`
pub struct InheritProperties<I> {
    inner: I,
    mode: InheritMode,
    current: Option<(Option<String>, Option<Arc<TableSpec>>)>,
}

impl<I> InheritProperties<I> {
    pub fn new(inner: I, mode: InheritMode) -> Self {
        Self { inner, mode, current: None }
    }
}

impl<I> Iterator for InheritProperties<I>
where
    I: Iterator<Item = Event>,
{
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        let event = self.inner.next()?;

        match event.kind {
            EventKind::StartTable => {
                self.current = Some((event.table_name.clone(), event.table_spec.clone()));
                Some(event)
            }
            EventKind::EndTable => {
                self.current = None;
                Some(event)
            }
            _ => match &self.current {
                None => Some(event),
                Some((name, spec)) => Some(match self.mode {
                    InheritMode::Override => event.with_table(name.clone(), spec.clone()),
                    InheritMode::Fill => {
                        let name = event.table_name.clone().or_else(|| name.clone());
                        let spec = event.table_spec.clone().or_else(|| spec.clone());
                        event.with_table(name, spec)
                    }
                }),
            },
        }
    }
}

/// Stage 3: attach the column spec matching a cell's header
///
/// A cell outside an identified table, or with a header the table does not
/// declare, stays unbound and is ignored by later stages.
pub fn bind_column(event: Event) -> Event {
    if !event.is(EventKind::Cell) || event.column_spec.is_some() {
        return event;
    }

    let column = match (&event.table_spec, &event.header) {
        (Some(spec), Some(header)) => spec.column_for_header(header).cloned(),
        _ => None,
    };

    match column {
        Some(column) => event.with_column_spec(column),
        None => event,
    }
}

/// Stage 4: flag blank cells whose column forbids blanks
pub fn log_blank(event: Event) -> Event {
    let forbidden = event
        .column_spec
        .as_ref()
        .filter(|column| !column.can_be_blank)
        .map(|column| column.id.clone());

    let Some(column_id) = forbidden else {
        return event;
    };
    if !event.is(EventKind::Cell) || !event.value.is_blank() {
        return event;
    }

    let message = format!("Column '{}' cannot be blank", column_id);
    event.with_error(ErrorEntry::new(ErrorKind::BlankNotAllowed, message))
}

/// Stage 5: coerce a bound cell to its column type
///
/// A failed conversion blanks the value and attaches a `ConversionError`.
pub fn conform_cell(event: Event) -> Event {
    let Some(column) = event.column_spec.clone() else {
        return event;
    };
    if !event.is(EventKind::Cell) {
        return event;
    }

    match conform(&event.value, &column.column_type) {
        Ok(value) => event.with_value(value),
        Err(e) => {
            let message = format!("Column '{}' ({}): {}", column.id, column.column_type.name(), e);
            event
                .with_value(Value::Blank)
                .with_error(ErrorEntry::new(ErrorKind::ConversionError, message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use returnkit_core::{ColumnSpec, ColumnType, NumericSpec};
    use std::collections::BTreeMap;

    fn lookup() -> BTreeMap<String, Arc<TableSpec>> {
        let header = TableSpec::new(
            "header",
            vec![
                ColumnSpec::new("CHILD", ColumnType::alphanumeric()),
                ColumnSpec::new("DOB", ColumnType::date("%d/%m/%Y")).with_blank_allowed(false),
            ],
        );
        let uasc = TableSpec::new(
            "uasc",
            vec![
                ColumnSpec::new("CHILD", ColumnType::alphanumeric()),
                ColumnSpec::new("DUC", ColumnType::date("%d/%m/%Y")),
            ],
        );
        let ages = TableSpec::new(
            "ages",
            vec![
                ColumnSpec::new("CHILD", ColumnType::alphanumeric()),
                ColumnSpec::new("AGE", ColumnType::Numeric(NumericSpec::integer())),
            ],
        );
        [header, uasc, ages]
            .into_iter()
            .map(|t| (t.id.clone(), Arc::new(t)))
            .collect()
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn identifies_by_header_set() {
        let event = identify_table(Event::start_table(headers(&["DOB", "CHILD"])), &lookup());
        assert_eq!(event.table_name.as_deref(), Some("header"));
        assert!(event.error.is_none());
    }

    #[test]
    fn blank_and_unknown_headers() {
        let blank = identify_table(Event::start_table(headers(&["", " "])), &lookup());
        assert_eq!(blank.error.map(|e| e.kind), Some(ErrorKind::BlankHeaders));

        let unknown = identify_table(Event::start_table(headers(&["CHILD", "UPN"])), &lookup());
        assert_eq!(unknown.error.map(|e| e.kind), Some(ErrorKind::UnidentifiedTable));
        assert!(unknown.table_name.is_none());
    }

    #[test]
    fn ambiguous_headers() {
        let mut specs = lookup();
        let copy = TableSpec::new("header_copy", vec![
            ColumnSpec::new("CHILD", ColumnType::alphanumeric()),
            ColumnSpec::new("DOB", ColumnType::alphanumeric()),
        ]);
        specs.insert(copy.id.clone(), Arc::new(copy));

        let event = identify_table(Event::start_table(headers(&["CHILD", "DOB"])), &specs);
        let error = event.error.unwrap();
        assert_eq!(error.kind, ErrorKind::UnidentifiedTable);
        assert!(error.message.contains("several tables"));
    }

    #[test]
    fn named_tables_resolve_spec() {
        let event = identify_table(Event::start_named_table("uasc"), &lookup());
        assert!(event.table_spec.is_some());

        let missing = identify_table(Event::start_named_table("reviews"), &lookup());
        assert_eq!(missing.error.map(|e| e.kind), Some(ErrorKind::UnidentifiedTable));
    }

    #[test]
    fn inheritance_stops_at_end_table() {
        let spec = lookup()["header"].clone();
        let events = vec![
            Event::start_named_table("header").with_table(Some("header".to_string()), Some(spec)),
            Event::start_row(Some(0)),
            Event::cell("CHILD", "1"),
            Event::end_row(),
            Event::end_table(),
            Event::cell("CHILD", "2"),
        ];

        let out: Vec<Event> = InheritProperties::new(events.into_iter(), InheritMode::Fill).collect();
        assert_eq!(out[2].table_name.as_deref(), Some("header"));
        assert!(out[4].table_name.is_none());
        assert!(out[5].table_name.is_none());
    }

    #[test]
    fn fill_mode_keeps_existing_properties() {
        let events = vec![
            Event::start_named_table("header").with_table(Some("header".to_string()), None),
            Event::cell("CHILD", "1").with_table(Some("own".to_string()), None),
        ];

        let filled: Vec<Event> = InheritProperties::new(events.clone().into_iter(), InheritMode::Fill).collect();
        assert_eq!(filled[1].table_name.as_deref(), Some("own"));

        let overridden: Vec<Event> = InheritProperties::new(events.into_iter(), InheritMode::Override).collect();
        assert_eq!(overridden[1].table_name.as_deref(), Some("header"));
    }

    #[test]
    fn bind_log_and_conform() {
        let spec = lookup()["header"].clone();
        let table = |e: Event| e.with_table(Some("header".to_string()), Some(spec.clone()));

        let dob = conform_cell(log_blank(bind_column(table(Event::cell("DOB", "01/02/2015")))));
        assert_eq!(dob.value, Value::Date(chrono::NaiveDate::from_ymd_opt(2015, 2, 1).unwrap()));
        assert!(dob.error.is_none());

        let blank = conform_cell(log_blank(bind_column(table(Event::cell("DOB", "")))));
        assert_eq!(blank.value, Value::Blank);
        assert_eq!(blank.error.map(|e| e.kind), Some(ErrorKind::BlankNotAllowed));

        let bad = conform_cell(log_blank(bind_column(table(Event::cell("DOB", "yesterday")))));
        assert_eq!(bad.value, Value::Blank);
        assert_eq!(bad.error.map(|e| e.kind), Some(ErrorKind::ConversionError));

        let unbound = conform_cell(log_blank(bind_column(table(Event::cell("UPN", "x")))));
        assert!(unbound.column_spec.is_none());
        assert_eq!(unbound.value, Value::text("x"));
    }
}
