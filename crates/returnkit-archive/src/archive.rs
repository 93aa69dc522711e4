//! Append-only snapshot archive
//!
//! Layout: `<root>/<authority>/<dataset>.<period>.<seq>/<table>.csv`, with
//! `seq` zero-padded to six digits. Every `add` creates a new snapshot
//! directory with a sequence number above every existing one; snapshot files
//! are never rewritten.
//!
//! The archive is not safe for concurrent writers to the same authority:
//! `add` reads the directory to pick a sequence number, then writes.

use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use returnkit_core::{DataContainer, DedupMode, ErrorContainer, TableLookup};

use crate::dedup::deduplicate;
use crate::error::ArchiveError;
use crate::period::Period;
use crate::table_io::{export_tables, read_table, write_new_table};

/// Identity of one snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotId {
    pub authority: String,
    pub dataset: String,
    pub period: Period,
    pub seq: u32,
}

impl SnapshotId {
    /// Directory name of the snapshot
    pub fn dir_name(&self) -> String {
        format!("{}.{}.{:06}", self.dataset, self.period, self.seq)
    }

    /// Parse a snapshot directory name
    pub fn parse(authority: &str, name: &str) -> Result<Self, ArchiveError> {
        let parts: Vec<&str> = name.split('.').collect();
        let [dataset, period, seq] = parts.as_slice() else {
            return Err(ArchiveError::InvalidSnapshot(name.to_string()));
        };

        let seq: u32 = seq
            .parse()
            .map_err(|_| ArchiveError::InvalidSnapshot(name.to_string()))?;

        Ok(Self {
            authority: authority.to_string(),
            dataset: dataset.to_string(),
            period: period.parse()?,
            seq,
        })
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.authority, self.dir_name())
    }
}

/// Snapshot archive for one dataset
pub struct SnapshotArchive<'a, L> {
    root: PathBuf,
    dataset: String,
    lookup: &'a L,
    row_addressable: bool,
}

impl<'a, L: TableLookup> SnapshotArchive<'a, L> {
    pub fn new(root: impl Into<PathBuf>, dataset: impl Into<String>, lookup: &'a L) -> Self {
        Self {
            root: root.into(),
            dataset: dataset.into(),
            lookup,
            row_addressable: true,
        }
    }

    /// Whether loaded tables map to numbered source rows (false for XML sources)
    pub fn with_row_addressable(mut self, row_addressable: bool) -> Self {
        self.row_addressable = row_addressable;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn authority_dir(&self, authority: &str) -> PathBuf {
        self.root.join(authority)
    }

    fn snapshot_dir(&self, id: &SnapshotId) -> PathBuf {
        self.authority_dir(&id.authority).join(id.dir_name())
    }

    /// Write every declared table of `data` as a new snapshot
    pub fn add(&self, data: &DataContainer, authority: &str, period: Period) -> Result<SnapshotId, ArchiveError> {
        let authority_dir = self.authority_dir(authority);
        std::fs::create_dir_all(&authority_dir).map_err(|e| ArchiveError::io(&authority_dir, e))?;

        let seq = self
            .list_snapshots(authority)
            .iter()
            .map(|s| s.seq)
            .max()
            .map_or(1, |max| max + 1);

        let id = SnapshotId {
            authority: authority.to_string(),
            dataset: self.dataset.clone(),
            period,
            seq,
        };
        let dir = self.snapshot_dir(&id);
        std::fs::create_dir(&dir).map_err(|e| ArchiveError::io(&dir, e))?;

        let normalised = data.normalised(self.lookup);
        for (table_id, table) in normalised.iter() {
            write_new_table(&dir.join(format!("{}.csv", table_id)), table)?;
        }

        let skipped: Vec<&str> = data
            .table_ids()
            .into_iter()
            .filter(|t| normalised.get(t).is_none())
            .collect();
        if !skipped.is_empty() {
            tracing::warn!(snapshot = %id, tables = ?skipped, "tables not in the schema were not archived");
        }

        tracing::info!(snapshot = %id, tables = normalised.len(), rows = normalised.row_count(), "added snapshot");
        Ok(id)
    }

    /// Snapshots of `authority`, in `(period, seq)` order
    ///
    /// A missing or unreadable authority directory yields no snapshots.
    pub fn list_snapshots(&self, authority: &str) -> Vec<SnapshotId> {
        let dir = self.authority_dir(authority);
        if !dir.is_dir() {
            tracing::warn!(authority = %authority, dir = %dir.display(), "no snapshot directory");
            return Vec::new();
        }

        let mut snapshots = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "failed to list snapshots");
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            match SnapshotId::parse(authority, &name) {
                Ok(id) if id.dataset == self.dataset => snapshots.push(id),
                Ok(_) => {}
                Err(e) => tracing::debug!(name = %name, error = %e, "ignoring directory"),
            }
        }

        snapshots.sort_by(|a, b| a.period.cmp(&b.period).then(a.seq.cmp(&b.seq)));
        snapshots
    }

    /// Load one snapshot, normalised to the current schema
    pub fn load_snapshot(&self, id: &SnapshotId) -> Result<DataContainer, ArchiveError> {
        let dir = self.snapshot_dir(id);
        let mut data = DataContainer::new();

        for spec in self.lookup.table_specs() {
            let path = dir.join(format!("{}.csv", spec.id));
            if !path.is_file() {
                continue;
            }
            let table = read_table(&path, Some(spec))?
                .normalised(spec)
                .with_row_addressable(self.row_addressable);
            data.insert(spec.id.clone(), table);
        }

        Ok(data)
    }

    /// Combine every snapshot of `authority` in order
    ///
    /// `Each` deduplicates after every fold step, `AfterAll` once at the end,
    /// `Never` not at all.
    pub fn current(&self, authority: &str, mode: DedupMode) -> Result<(DataContainer, ErrorContainer), ArchiveError> {
        let mut combined = DataContainer::new();
        let mut errors = ErrorContainer::new();

        let snapshots = self.list_snapshots(authority);
        for id in &snapshots {
            combined.merge(self.load_snapshot(id)?);

            if mode == DedupMode::Each {
                let (deduplicated, dropped) = deduplicate(&combined, self.lookup);
                combined = deduplicated;
                errors.extend(dropped);
            }
        }

        if mode == DedupMode::AfterAll {
            let (deduplicated, dropped) = deduplicate(&combined, self.lookup);
            combined = deduplicated;
            errors.extend(dropped);
        }

        tracing::info!(
            authority = %authority,
            snapshots = snapshots.len(),
            mode = %mode,
            rows = combined.row_count(),
            removed = errors.len(),
            "combined snapshots"
        );
        Ok((combined, errors))
    }

    /// Write the current view of `authority` as `<authority>_<table>.csv` files
    pub fn export_current(
        &self,
        authority: &str,
        mode: DedupMode,
        dir: &Path,
        profile: Option<&str>,
    ) -> Result<(Vec<PathBuf>, ErrorContainer), ArchiveError> {
        let (combined, errors) = self.current(authority, mode)?;
        let view = match profile {
            Some(profile) => combined.for_profile(self.lookup, profile),
            None => combined,
        };
        let written = export_tables(&view, dir, authority)?;
        Ok((written, errors))
    }

    /// Delete snapshots
    pub fn delete_snapshots(&self, ids: &[SnapshotId]) -> Result<(), ArchiveError> {
        for id in ids {
            let dir = self.snapshot_dir(id);
            std::fs::remove_dir_all(&dir).map_err(|e| ArchiveError::io(&dir, e))?;
            tracing::info!(snapshot = %id, "deleted snapshot");
        }
        Ok(())
    }
}
