//! Combination of already-exported files
//!
//! Unlike the archive, the aggregator has no snapshot metadata: the table of
//! each file is taken from its name, and files are concatenated in the order
//! given.

use std::path::{Path, PathBuf};

use returnkit_core::{DataContainer, ErrorContainer, TableLookup};

use crate::dedup::deduplicate;
use crate::error::ArchiveError;
use crate::table_io::{export_tables, read_table};

pub struct Aggregator<'a, L> {
    lookup: &'a L,
    row_addressable: bool,
}

impl<'a, L: TableLookup> Aggregator<'a, L> {
    pub fn new(lookup: &'a L) -> Self {
        Self { lookup, row_addressable: true }
    }

    pub fn with_row_addressable(mut self, row_addressable: bool) -> Self {
        self.row_addressable = row_addressable;
        self
    }

    /// Table a file holds: the longest table id its stem ends with
    ///
    /// The id must be the whole stem or follow a `_`, `-` or `.` separator.
    /// Matching ignores case.
    pub fn table_for_file(&self, path: &Path) -> Option<String> {
        let stem = path.file_stem()?.to_string_lossy().to_lowercase();

        self.lookup
            .table_specs()
            .into_iter()
            .map(|spec| spec.id.as_str())
            .filter(|id| {
                let id = id.to_lowercase();
                stem == id
                    || stem
                        .strip_suffix(id.as_str())
                        .map_or(false, |rest| rest.ends_with(['_', '-', '.']))
            })
            .max_by_key(|id| id.len())
            .map(str::to_string)
    }

    /// Concatenate `files` per table, optionally deduplicating once at the end
    pub fn combine(&self, files: &[PathBuf], dedup: bool) -> Result<(DataContainer, ErrorContainer), ArchiveError> {
        let mut combined = DataContainer::new();

        for path in files {
            let Some(table_id) = self.table_for_file(path) else {
                tracing::warn!(file = %path.display(), "no table matches file name; skipped");
                continue;
            };
            let Some(spec) = self.lookup.table_spec(&table_id) else {
                continue;
            };

            let table = read_table(path, Some(spec))?
                .normalised(spec)
                .with_row_addressable(self.row_addressable);
            tracing::debug!(file = %path.display(), table = %table_id, rows = table.len(), "read file");

            let mut single = DataContainer::new();
            single.insert(table_id, table);
            combined.merge(single);
        }

        if !dedup {
            return Ok((combined, ErrorContainer::new()));
        }

        let (deduplicated, errors) = deduplicate(&combined, self.lookup);
        tracing::info!(
            files = files.len(),
            rows = deduplicated.row_count(),
            removed = errors.len(),
            "aggregated files"
        );
        Ok((deduplicated, errors))
    }

    /// Write `<prefix>_<table>.csv` files
    pub fn export(&self, container: &DataContainer, dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, ArchiveError> {
        export_tables(container, dir, prefix)
    }
}
