//! CSV reading and writing of typed tables
//!
//! Cells are written with `Value::render` and read back with
//! `Value::from_stored`, so a table survives a write/read cycle unchanged.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};

use returnkit_core::{DataContainer, Record, Table, TableSpec, Value};

use crate::error::ArchiveError;

fn write_rows<W: Write>(writer: W, table: &Table, path: &Path) -> Result<(), ArchiveError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(&table.columns).map_err(|e| ArchiveError::csv(path, e))?;

    for row in &table.rows {
        let cells: Vec<String> = table
            .columns
            .iter()
            .map(|c| row.get(c).map(Value::render).unwrap_or_default())
            .collect();
        csv.write_record(&cells).map_err(|e| ArchiveError::csv(path, e))?;
    }

    csv.flush().map_err(|e| ArchiveError::io(path, e))
}

/// Write a table to a file that must not exist yet
pub fn write_new_table(path: &Path, table: &Table) -> Result<(), ArchiveError> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            IoErrorKind::AlreadyExists => ArchiveError::SnapshotExists(path.display().to_string()),
            _ => ArchiveError::io(path, e),
        })?;
    write_rows(file, table, path)
}

/// Write a table, replacing any existing file
pub fn export_table(path: &Path, table: &Table) -> Result<(), ArchiveError> {
    let file = File::create(path).map_err(|e| ArchiveError::io(path, e))?;
    write_rows(file, table, path)
}

/// Read a table; `spec` types the cells of the columns it declares
pub fn read_table(path: &Path, spec: Option<&TableSpec>) -> Result<Table, ArchiveError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| ArchiveError::csv(path, e))?;

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| ArchiveError::csv(path, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let column_types: Vec<_> = columns
        .iter()
        .map(|c| spec.and_then(|s| s.column(c)).map(|c| c.column_type.clone()))
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ArchiveError::csv(path, e))?;
        let row: Record = columns
            .iter()
            .zip(&column_types)
            .enumerate()
            .map(|(i, (column, column_type))| {
                let raw = record.get(i).unwrap_or_default();
                (column.clone(), Value::from_stored(raw, column_type.as_ref()))
            })
            .collect();
        rows.push(row);
    }

    Ok(Table::new(columns).with_rows(rows))
}

/// Write every table of `container` as `<prefix>_<table>.csv` in `dir`
pub fn export_tables(container: &DataContainer, dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, ArchiveError> {
    std::fs::create_dir_all(dir).map_err(|e| ArchiveError::io(dir, e))?;

    let mut written = Vec::with_capacity(container.len());
    for (table_id, table) in container.iter() {
        let name = if prefix.is_empty() {
            format!("{}.csv", table_id)
        } else {
            format!("{}_{}.csv", prefix, table_id)
        };
        let path = dir.join(name);
        export_table(&path, table)?;
        tracing::debug!(path = %path.display(), rows = table.len(), "exported table");
        written.push(path);
    }

    Ok(written)
}
