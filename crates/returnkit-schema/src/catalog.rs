//! Year-versioned schema catalog
//!
//! A catalog is built once per run for one submission year and passed by
//! reference to every consumer. There is no process-wide cache.

use regex::Regex;
use serde_yaml::{Mapping, Value as Yaml};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use returnkit_core::{ColumnSpec, TableLookup, TableSpec};

use crate::diff::apply_diff;
use crate::document::{scalar_to_string, ColumnDefinition, SchemaDiff, SchemaDocument};
use crate::error::SchemaError;

/// Schema files found for one dataset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaFiles {
    /// year -> complete base schema
    pub bases: BTreeMap<u16, PathBuf>,

    /// year -> diff against the previous year
    pub diffs: BTreeMap<u16, PathBuf>,
}

impl SchemaFiles {
    /// Find `<dataset>_schema_<year>.yml` and `<dataset>_schema_<year>.diff.yml` in `dir`
    pub fn discover(dir: &Path, dataset: &str) -> Result<Self, SchemaError> {
        let pattern = Regex::new(&format!(
            r"^{}_schema_(\d{{4}})(\.diff)?\.ya?ml$",
            regex::escape(dataset)
        ))
        .map_err(|e| SchemaError::ParseError(dir.display().to_string(), e.to_string()))?;

        let mut files = SchemaFiles::default();

        for entry in WalkDir::new(dir).max_depth(1) {
            let entry = entry.map_err(|e| SchemaError::IoError(dir.display().to_string(), e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            let Some(captures) = pattern.captures(&name) else {
                continue;
            };
            let Ok(year) = captures[1].parse::<u16>() else {
                continue;
            };

            if captures.get(2).is_some() {
                files.diffs.insert(year, entry.path().to_path_buf());
            } else {
                files.bases.insert(year, entry.path().to_path_buf());
            }
        }

        Ok(files)
    }

    /// Latest base at or before `year`, and the diffs after it up to `year`
    pub fn plan(&self, year: u16) -> Option<(u16, &PathBuf, Vec<(u16, &PathBuf)>)> {
        let (base_year, base) = self.bases.range(..=year).next_back()?;
        let diffs = self
            .diffs
            .range((Bound::Excluded(*base_year), Bound::Included(year)))
            .map(|(y, p)| (*y, p))
            .collect();
        Some((*base_year, base, diffs))
    }
}

/// Immutable, resolved schema for one dataset and year
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    /// Target year
    pub year: u16,

    /// Year of the base schema it was built from
    pub base_year: u16,

    /// Years of the diffs applied, in order
    pub applied_diffs: Vec<u16>,

    column_map: Mapping,
    tables: BTreeMap<String, Arc<TableSpec>>,
}

impl SchemaCatalog {
    /// Build the catalog for `year` from the schema files of `dataset` in `dir`
    pub fn build(dataset: &str, year: u16, dir: &Path) -> Result<Self, SchemaError> {
        let files = SchemaFiles::discover(dir, dataset)?;
        let (base_year, base_path, diff_paths) = files.plan(year).ok_or_else(|| SchemaError::MissingBase {
            dataset: dataset.to_string(),
            year,
        })?;

        let base = SchemaDocument::from_file(base_path)?;
        let mut diffs = Vec::with_capacity(diff_paths.len());
        for (diff_year, path) in diff_paths {
            diffs.push((diff_year, SchemaDiff::from_file(path)?));
        }

        let catalog = Self::from_documents(year, base_year, &base, &diffs)?;
        tracing::info!(
            dataset = %dataset,
            year,
            base_year,
            diffs = ?catalog.applied_diffs,
            tables = catalog.tables.len(),
            "built schema catalog"
        );
        Ok(catalog)
    }

    /// Build from already-parsed documents; diffs must be in increasing year order
    pub fn from_documents(
        year: u16,
        base_year: u16,
        base: &SchemaDocument,
        diffs: &[(u16, SchemaDiff)],
    ) -> Result<Self, SchemaError> {
        // Profiles must name tables the base declares; a diff may still remove them later
        for table in base.profiles.keys() {
            if !base.column_map.contains_key(table.as_str()) {
                return Err(SchemaError::UnknownTable(table.clone()));
            }
        }

        let mut column_map = base.column_map.clone();
        let mut applied_diffs = Vec::new();

        for (diff_year, diff) in diffs {
            column_map = apply_diff(&column_map, diff)?;
            applied_diffs.push(*diff_year);
        }

        let tables = resolve_tables(&column_map, &base.profiles)?;

        Ok(Self {
            year,
            base_year,
            applied_diffs,
            column_map,
            tables,
        })
    }

    /// Resolved `column_map` tree (after diffs)
    pub fn column_map(&self) -> &Mapping {
        &self.column_map
    }

    /// Look up a table
    pub fn for_table(&self, id: &str) -> Result<&Arc<TableSpec>, SchemaError> {
        self.tables
            .get(id)
            .ok_or_else(|| SchemaError::UnknownTable(id.to_string()))
    }

    /// Look up a column of a table
    pub fn for_column(&self, table_id: &str, column_id: &str) -> Result<&Arc<ColumnSpec>, SchemaError> {
        self.for_table(table_id)?
            .column(column_id)
            .ok_or_else(|| SchemaError::UnknownColumn {
                table: table_id.to_string(),
                column: column_id.to_string(),
            })
    }

    /// All tables keyed by id
    pub fn tables(&self) -> &BTreeMap<String, Arc<TableSpec>> {
        &self.tables
    }

    pub fn table_ids(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }
}

impl TableLookup for SchemaCatalog {
    fn table_spec(&self, id: &str) -> Option<&Arc<TableSpec>> {
        self.tables.get(id)
    }

    fn table_specs(&self) -> Vec<&Arc<TableSpec>> {
        self.tables.values().collect()
    }
}

/// Resolve a `column_map` tree into table specs
pub fn resolve_tables(
    column_map: &Mapping,
    profiles: &BTreeMap<String, Vec<String>>,
) -> Result<BTreeMap<String, Arc<TableSpec>>, SchemaError> {
    let mut tables = BTreeMap::new();

    for (table_key, columns) in column_map {
        let table_id = scalar_to_string(table_key).unwrap_or_default();
        let columns = columns.as_mapping().ok_or_else(|| SchemaError::InvalidColumn {
            table: table_id.clone(),
            column: String::new(),
            reason: "table must be a mapping of columns".to_string(),
        })?;

        let mut specs = Vec::with_capacity(columns.len());
        for (column_key, definition) in columns {
            let column_id = scalar_to_string(column_key).unwrap_or_default();
            let definition: ColumnDefinition = serde_yaml::from_value(match definition {
                Yaml::Null => Yaml::Mapping(Mapping::new()),
                other => other.clone(),
            })
            .map_err(|e| SchemaError::InvalidColumn {
                table: table_id.clone(),
                column: column_id.clone(),
                reason: e.to_string(),
            })?;
            specs.push(definition.resolve(&table_id, &column_id)?);
        }

        let spec = TableSpec::new(table_id.clone(), specs)
            .with_retained_profiles(profiles.get(&table_id).cloned());
        tables.insert(table_id, Arc::new(spec));
    }

    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use returnkit_core::ColumnType;

    const BASE: &str = r#"
column_map:
  header:
    CHILD:
      string: alphanumeric
      unique_key: yes
      sort: 1
    YEAR:
      numeric:
        type: integer
      sort: 0
      asc: no
  episodes:
    CHILD:
      string: alphanumeric
    DECOM:
      date: "%d/%m/%Y"
"#;

    #[test]
    fn resolves_tables_and_keys() {
        let base = SchemaDocument::parse(BASE, "base.yml").unwrap();
        let catalog = SchemaCatalog::from_documents(2023, 2023, &base, &[]).unwrap();

        assert_eq!(catalog.table_ids(), vec!["episodes", "header"]);
        let header = catalog.for_table("header").unwrap();
        assert_eq!(header.column_ids(), vec!["CHILD", "YEAR"]);
        assert_eq!(header.unique_key, vec!["CHILD"]);
        assert_eq!(header.sort_keys[0].column, "YEAR");
        assert!(!header.sort_keys[0].ascending);
    }

    #[test]
    fn lookups_fail_with_names() {
        let base = SchemaDocument::parse(BASE, "base.yml").unwrap();
        let catalog = SchemaCatalog::from_documents(2023, 2023, &base, &[]).unwrap();

        assert_eq!(
            catalog.for_table("reviews").unwrap_err(),
            SchemaError::UnknownTable("reviews".to_string())
        );
        assert!(matches!(
            catalog.for_column("header", "UPN"),
            Err(SchemaError::UnknownColumn { .. })
        ));
        assert!(matches!(
            catalog.for_column("episodes", "DECOM").unwrap().column_type,
            ColumnType::Date { .. }
        ));
    }

    #[test]
    fn diffs_apply_in_order() {
        let base = SchemaDocument::parse(BASE, "base.yml").unwrap();
        let first = SchemaDiff::parse("episodes.DEC:\n  type: add\n  value: {date: \"%d/%m/%Y\"}\n", "2024.diff").unwrap();
        let second = SchemaDiff::parse("episodes.DEC:\n  type: rename\n  value: DATE_CEASED\n", "2025.diff").unwrap();

        let catalog = SchemaCatalog::from_documents(2025, 2023, &base, &[(2024, first), (2025, second)]).unwrap();

        assert_eq!(catalog.applied_diffs, vec![2024, 2025]);
        assert_eq!(
            catalog.for_table("episodes").unwrap().column_ids(),
            vec!["CHILD", "DECOM", "DATE_CEASED"]
        );
    }

    #[test]
    fn plan_picks_latest_base_and_following_diffs() {
        let mut files = SchemaFiles::default();
        files.bases.insert(2019, PathBuf::from("b2019"));
        files.bases.insert(2022, PathBuf::from("b2022"));
        files.diffs.insert(2021, PathBuf::from("d2021"));
        files.diffs.insert(2023, PathBuf::from("d2023"));
        files.diffs.insert(2024, PathBuf::from("d2024"));
        files.diffs.insert(2025, PathBuf::from("d2025"));

        let (base_year, _, diffs) = files.plan(2024).unwrap();
        assert_eq!(base_year, 2022);
        assert_eq!(diffs.iter().map(|(y, _)| *y).collect::<Vec<_>>(), vec![2023, 2024]);

        assert!(files.plan(2018).is_none());
    }

    #[test]
    fn plan_for_a_base_year_applies_no_diffs() {
        let mut files = SchemaFiles::default();
        files.bases.insert(2023, PathBuf::from("b2023"));
        files.diffs.insert(2024, PathBuf::from("d2024"));

        let (base_year, _, diffs) = files.plan(2023).unwrap();
        assert_eq!(base_year, 2023);
        assert!(diffs.is_empty());

        let (_, _, diffs) = files.plan(2024).unwrap();
        assert_eq!(diffs.iter().map(|(y, _)| *y).collect::<Vec<_>>(), vec![2024]);
    }

    #[test]
    fn profiles_must_name_declared_tables() {
        let yaml = format!("{}profiles:\n  reviews: [PAN]\n", BASE);
        let base = SchemaDocument::parse(&yaml, "base.yml").unwrap();

        assert_eq!(
            SchemaCatalog::from_documents(2023, 2023, &base, &[]).unwrap_err(),
            SchemaError::UnknownTable("reviews".to_string())
        );
    }
}
