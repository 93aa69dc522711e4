//! Sort-then-deduplicate
//!
//! Rows are stable-sorted by the table's sort keys (primary first, each in
//! its own direction), then every row whose unique-key values repeat an
//! earlier row is dropped. Sort order therefore encodes priority: the first
//! row after sorting survives. Re-running on the output removes nothing.

use std::cmp::Ordering;
use std::collections::HashSet;

use returnkit_core::{DataContainer, ErrorContainer, ErrorEntry, ErrorKind, Table, TableLookup, TableSpec};

/// Deduplicate every table of `container` that `lookup` declares
///
/// Tables the lookup does not know pass through unchanged.
pub fn deduplicate(container: &DataContainer, lookup: &impl TableLookup) -> (DataContainer, ErrorContainer) {
    let mut errors = ErrorContainer::new();

    let tables: DataContainer = container
        .iter()
        .map(|(table_id, table)| {
            let table = match lookup.table_spec(table_id) {
                Some(spec) => {
                    let (table, dropped) = deduplicate_table(table, spec);
                    errors.extend(dropped);
                    table
                }
                None => table.clone(),
            };
            (table_id.clone(), table)
        })
        .collect();

    (tables, errors)
}

/// Sort and deduplicate one table
pub fn deduplicate_table(table: &Table, spec: &TableSpec) -> (Table, ErrorContainer) {
    let mut order: Vec<usize> = (0..table.len()).collect();

    if !spec.sort_keys.is_empty() {
        order.sort_by(|&a, &b| {
            spec.sort_keys
                .iter()
                .map(|key| {
                    table
                        .value(a, &key.column)
                        .sort_cmp(table.value(b, &key.column), key.ascending)
                })
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }

    let mut errors = ErrorContainer::new();
    if spec.unique_key.is_empty() {
        let rows = order.into_iter().map(|i| table.rows[i].clone()).collect();
        return (table.clone().with_rows(rows), errors);
    }

    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut rows = Vec::with_capacity(table.len());

    for index in order {
        let key: Vec<String> = spec
            .unique_key
            .iter()
            .map(|column| table.value(index, column).render())
            .collect();

        if seen.contains(&key) {
            let described: Vec<String> = spec
                .unique_key
                .iter()
                .zip(&key)
                .map(|(column, value)| format!("{}={}", column, value))
                .collect();
            let mut entry = ErrorEntry::new(
                ErrorKind::DuplicateRemoval,
                format!("Removed duplicate row ({})", described.join(", ")),
            )
            .with_table(spec.id.clone());
            if table.row_addressable {
                entry = entry.with_row_number(index + 1);
            }
            errors.push(entry);
            continue;
        }

        seen.insert(key);
        rows.push(table.rows[index].clone());
    }

    if !errors.is_empty() {
        tracing::debug!(table = %spec.id, removed = errors.len(), "removed duplicate rows");
    }

    (table.clone().with_rows(rows), errors)
}
