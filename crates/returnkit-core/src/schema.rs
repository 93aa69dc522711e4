//! Column and table specifications
//!
//! These are the resolved, immutable form of a year's schema. They are built
//! once (by the schema crate) and shared behind `Arc` by every stream event
//! that references them.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Compile `pattern` so that it must match the whole input
pub fn full_match_regex(pattern: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
    let flags = if case_insensitive { "(?i)" } else { "" };
    Regex::new(&format!("{}^(?:{})$", flags, pattern))
}

/// How a string column is validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StringKind {
    /// Any text
    Alphanumeric,

    /// UK-style postcode
    Postcode,

    /// Must match one of the column's cell patterns
    Regex,
}

/// Numeric storage kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericKind {
    Integer,
    Float,
}

/// Numeric constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSpec {
    /// Integer or float
    #[serde(rename = "type")]
    pub kind: NumericKind,

    /// Inclusive lower bound
    #[serde(default, rename = "min_value")]
    pub min: Option<f64>,

    /// Inclusive upper bound
    #[serde(default, rename = "max_value")]
    pub max: Option<f64>,

    /// Rounding applied to float values
    #[serde(default)]
    pub decimal_places: Option<u32>,
}

impl NumericSpec {
    /// Unbounded integer
    pub fn integer() -> Self {
        Self { kind: NumericKind::Integer, min: None, max: None, decimal_places: None }
    }

    /// Unbounded float
    pub fn float() -> Self {
        Self { kind: NumericKind::Float, min: None, max: None, decimal_places: None }
    }

    /// Set the inclusive range
    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Set rounding
    pub fn with_decimal_places(mut self, places: u32) -> Self {
        self.decimal_places = Some(places);
        self
    }
}

/// One permitted value of a category column
#[derive(Debug, Clone)]
pub struct CategoryCandidate {
    /// Canonical code written to the output
    pub code: String,

    /// Human-readable name (also accepted as input)
    pub name: Option<String>,

    /// Alternative spellings, compiled as whole-input, case-insensitive patterns
    pub patterns: Vec<Regex>,
}

impl CategoryCandidate {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: None,
            patterns: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_patterns(mut self, patterns: Vec<Regex>) -> Self {
        self.patterns = patterns;
        self
    }
}

/// Column type, with the constraints that belong to it
#[derive(Debug, Clone)]
pub enum ColumnType {
    /// Free or validated text
    String {
        kind: StringKind,
        /// Cell patterns (used by `StringKind::Regex`)
        patterns: Vec<Regex>,
    },

    /// Date parsed with a `chrono` format string
    Date { format: String },

    /// Integer or float
    Numeric(NumericSpec),

    /// Closed set of codes, in precedence order
    Category(Vec<CategoryCandidate>),
}

impl ColumnType {
    /// Unvalidated text
    pub fn alphanumeric() -> Self {
        Self::String { kind: StringKind::Alphanumeric, patterns: Vec::new() }
    }

    pub fn date(format: impl Into<String>) -> Self {
        Self::Date { format: format.into() }
    }

    /// Short name used in messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::String { .. } => "string",
            Self::Date { .. } => "date",
            Self::Numeric(_) => "numeric",
            Self::Category(_) => "category",
        }
    }
}

/// A column in a table
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    /// Column id (also the export header)
    pub id: String,

    /// Type and constraints
    pub column_type: ColumnType,

    /// Whether an empty cell is acceptable
    pub can_be_blank: bool,

    /// Alternative header spellings accepted in source files
    pub header_patterns: Vec<Regex>,

    /// Part of the table's unique key
    pub unique_key: bool,

    /// Sort priority (0 = primary)
    pub sort: Option<u32>,

    /// Sort direction
    pub ascending: bool,

    /// Export profiles that drop this column
    pub exclude: Vec<String>,
}

impl ColumnSpec {
    /// Create a column that allows blanks and takes no part in keys or sorting
    pub fn new(id: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            id: id.into(),
            column_type,
            can_be_blank: true,
            header_patterns: Vec::new(),
            unique_key: false,
            sort: None,
            ascending: true,
            exclude: Vec::new(),
        }
    }

    pub fn with_blank_allowed(mut self, can_be_blank: bool) -> Self {
        self.can_be_blank = can_be_blank;
        self
    }

    pub fn with_header_patterns(mut self, patterns: Vec<Regex>) -> Self {
        self.header_patterns = patterns;
        self
    }

    pub fn with_unique_key(mut self, unique_key: bool) -> Self {
        self.unique_key = unique_key;
        self
    }

    pub fn with_sort(mut self, priority: u32, ascending: bool) -> Self {
        self.sort = Some(priority);
        self.ascending = ascending;
        self
    }

    pub fn with_exclude(mut self, profiles: Vec<String>) -> Self {
        self.exclude = profiles;
        self
    }

    /// Whether a source header refers to this column
    pub fn matches_header(&self, header: &str) -> bool {
        let header = header.trim();
        header == self.id || self.header_patterns.iter().any(|p| p.is_match(header))
    }

    /// Whether this column survives export under `profile`
    pub fn is_retained_for(&self, profile: &str) -> bool {
        !self.exclude.iter().any(|p| p == profile)
    }
}

/// One (column, direction) sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub ascending: bool,
}

/// A table in the schema
#[derive(Debug, Clone)]
pub struct TableSpec {
    /// Table id
    pub id: String,

    /// Columns in export order
    pub columns: Vec<Arc<ColumnSpec>>,

    /// Columns forming the unique key, in column order
    pub unique_key: Vec<String>,

    /// Sort keys, primary first
    pub sort_keys: Vec<SortKey>,

    /// Profiles that keep this table (`None` = every profile)
    pub retained_profiles: Option<Vec<String>>,
}

impl TableSpec {
    /// Build a table, deriving unique key and sort keys from the column flags
    pub fn new(id: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        let columns: Vec<Arc<ColumnSpec>> = columns.into_iter().map(Arc::new).collect();

        let unique_key = columns
            .iter()
            .filter(|c| c.unique_key)
            .map(|c| c.id.clone())
            .collect();

        let mut sorted: Vec<&Arc<ColumnSpec>> = columns.iter().filter(|c| c.sort.is_some()).collect();
        sorted.sort_by_key(|c| c.sort);
        let sort_keys = sorted
            .into_iter()
            .map(|c| SortKey { column: c.id.clone(), ascending: c.ascending })
            .collect();

        Self {
            id: id.into(),
            columns,
            unique_key,
            sort_keys,
            retained_profiles: None,
        }
    }

    pub fn with_retained_profiles(mut self, profiles: Option<Vec<String>>) -> Self {
        self.retained_profiles = profiles;
        self
    }

    /// Find a column by id
    pub fn column(&self, id: &str) -> Option<&Arc<ColumnSpec>> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Find the column a source header refers to
    pub fn column_for_header(&self, header: &str) -> Option<&Arc<ColumnSpec>> {
        self.column(header.trim())
            .or_else(|| self.columns.iter().find(|c| c.matches_header(header)))
    }

    /// Column ids in export order
    pub fn column_ids(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.id.clone()).collect()
    }

    /// True when the non-blank headers map one-to-one onto this table's columns
    pub fn matches_headers(&self, headers: &[String]) -> bool {
        let headers: Vec<&str> = headers
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .collect();

        if headers.len() != self.columns.len() {
            return false;
        }

        let mut matched = vec![false; self.columns.len()];
        for header in headers {
            let position = self
                .columns
                .iter()
                .position(|c| c.id == header)
                .or_else(|| self.columns.iter().position(|c| c.matches_header(header)));
            match position {
                Some(i) if !matched[i] => matched[i] = true,
                _ => return false,
            }
        }
        true
    }

    /// Whether this table survives export under `profile`
    pub fn is_retained_for(&self, profile: &str) -> bool {
        self.retained_profiles
            .as_ref()
            .map_or(true, |profiles| profiles.iter().any(|p| p == profile))
    }

    /// Column ids kept under `profile`, in export order
    pub fn columns_for_profile(&self, profile: &str) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.is_retained_for(profile))
            .map(|c| c.id.clone())
            .collect()
    }
}

/// Anything that can resolve a table id to its spec
pub trait TableLookup {
    /// Resolve a table id
    fn table_spec(&self, id: &str) -> Option<&Arc<TableSpec>>;

    /// All table specs, in id order
    fn table_specs(&self) -> Vec<&Arc<TableSpec>>;
}

impl TableLookup for BTreeMap<String, Arc<TableSpec>> {
    fn table_spec(&self, id: &str) -> Option<&Arc<TableSpec>> {
        self.get(id)
    }

    fn table_specs(&self) -> Vec<&Arc<TableSpec>> {
        self.values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_table() -> TableSpec {
        TableSpec::new(
            "header",
            vec![
                ColumnSpec::new("CHILD", ColumnType::alphanumeric())
                    .with_unique_key(true)
                    .with_sort(1, true),
                ColumnSpec::new("YEAR", ColumnType::Numeric(NumericSpec::integer()))
                    .with_sort(0, false),
                ColumnSpec::new("DOB", ColumnType::date("%d/%m/%Y"))
                    .with_header_patterns(vec![full_match_regex("date of birth", true).unwrap()])
                    .with_exclude(vec!["PAN".to_string()]),
            ],
        )
    }

    #[test]
    fn derives_keys_from_column_flags() {
        let table = header_table();
        assert_eq!(table.unique_key, vec!["CHILD"]);
        assert_eq!(
            table.sort_keys,
            vec![
                SortKey { column: "YEAR".to_string(), ascending: false },
                SortKey { column: "CHILD".to_string(), ascending: true },
            ]
        );
    }

    #[test]
    fn header_matching_uses_ids_and_patterns() {
        let table = header_table();
        let headers = vec!["YEAR".to_string(), "Date Of Birth".to_string(), "CHILD".to_string(), " ".to_string()];
        assert!(table.matches_headers(&headers));
        assert_eq!(table.column_for_header("date of birth").unwrap().id, "DOB");

        let missing = vec!["YEAR".to_string(), "CHILD".to_string()];
        assert!(!table.matches_headers(&missing));

        let repeated = vec!["YEAR".to_string(), "YEAR".to_string(), "CHILD".to_string()];
        assert!(!table.matches_headers(&repeated));
    }

    #[test]
    fn profile_filters() {
        let table = header_table().with_retained_profiles(Some(vec!["PAN".to_string()]));
        assert!(table.is_retained_for("PAN"));
        assert!(!table.is_retained_for("SUFFICIENCY"));
        assert_eq!(table.columns_for_profile("PAN"), vec!["CHILD", "YEAR"]);
    }
}
