//! Typed records and tables

use std::collections::BTreeMap;

use crate::schema::{TableLookup, TableSpec};
use crate::value::Value;

/// One logical row: column id -> value
pub type Record = BTreeMap<String, Value>;

/// Rows of one table with an explicit column order
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Column ids in output order
    pub columns: Vec<String>,

    /// Rows
    pub rows: Vec<Record>,

    /// Whether rows correspond to numbered rows of a tabular source
    pub row_addressable: bool,
}

impl Table {
    /// Create an empty, row-addressable table
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            row_addressable: true,
        }
    }

    pub fn with_rows(mut self, rows: Vec<Record>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_row_addressable(mut self, row_addressable: bool) -> Self {
        self.row_addressable = row_addressable;
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` in row `index` (blank when absent)
    pub fn value(&self, index: usize, column: &str) -> &Value {
        static BLANK: Value = Value::Blank;
        self.rows
            .get(index)
            .and_then(|row| row.get(column))
            .unwrap_or(&BLANK)
    }

    /// Restrict to exactly `columns`, in that order; missing columns become blank
    pub fn project(&self, columns: &[String]) -> Table {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| (c.clone(), row.get(c).cloned().unwrap_or_default()))
                    .collect()
            })
            .collect();

        Table {
            columns: columns.to_vec(),
            rows,
            row_addressable: self.row_addressable,
        }
    }

    /// Schema-normalised copy: the spec's columns, in the spec's order
    pub fn normalised(&self, spec: &TableSpec) -> Table {
        self.project(&spec.column_ids())
    }

    /// Append another table's rows; columns unknown to `self` are added at the end
    pub fn concat(&mut self, other: Table) {
        for column in &other.columns {
            if !self.columns.contains(column) {
                self.columns.push(column.clone());
            }
        }
        self.row_addressable = self.row_addressable && other.row_addressable;
        self.rows.extend(other.rows);
    }
}

/// All tables produced from one file (or one combined view), keyed by table id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataContainer {
    tables: BTreeMap<String, Table>,
}

impl DataContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table_id: impl Into<String>, table: Table) {
        self.tables.insert(table_id.into(), table);
    }

    pub fn get(&self, table_id: &str) -> Option<&Table> {
        self.tables.get(table_id)
    }

    pub fn get_mut(&mut self, table_id: &str) -> Option<&mut Table> {
        self.tables.get_mut(table_id)
    }

    pub fn remove(&mut self, table_id: &str) -> Option<Table> {
        self.tables.remove(table_id)
    }

    /// Table ids in sorted order
    pub fn table_ids(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Table)> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Total rows across tables
    pub fn row_count(&self) -> usize {
        self.tables.values().map(Table::len).sum()
    }

    /// Concatenate `other` into `self`, table by table
    pub fn merge(&mut self, other: DataContainer) {
        for (table_id, table) in other.tables {
            match self.tables.get_mut(&table_id) {
                Some(existing) => existing.concat(table),
                None => {
                    self.tables.insert(table_id, table);
                }
            }
        }
    }

    /// Keep only tables declared in `lookup`, each normalised to its spec
    pub fn normalised(&self, lookup: &impl TableLookup) -> DataContainer {
        let tables = self
            .tables
            .iter()
            .filter_map(|(id, table)| {
                lookup
                    .table_spec(id)
                    .map(|spec| (id.clone(), table.normalised(spec)))
            })
            .collect();
        DataContainer { tables }
    }

    /// Export view for a profile: drop tables the profile does not retain and
    /// columns it excludes
    pub fn for_profile(&self, lookup: &impl TableLookup, profile: &str) -> DataContainer {
        let tables = self
            .tables
            .iter()
            .filter_map(|(id, table)| {
                let spec = lookup.table_spec(id)?;
                if !spec.is_retained_for(profile) {
                    return None;
                }
                Some((id.clone(), table.project(&spec.columns_for_profile(profile))))
            })
            .collect();
        DataContainer { tables }
    }
}

impl IntoIterator for DataContainer {
    type Item = (String, Table);
    type IntoIter = std::collections::btree_map::IntoIter<String, Table>;

    fn into_iter(self) -> Self::IntoIter {
        self.tables.into_iter()
    }
}

impl FromIterator<(String, Table)> for DataContainer {
    fn from_iter<I: IntoIterator<Item = (String, Table)>>(iter: I) -> Self {
        Self {
            tables: iter.into_iter().collect(),
        }
    }
}
