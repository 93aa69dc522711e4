//! Schema and diff document parsing
//!
//! Documents are YAML. The `column_map` tree is kept as an ordered
//! `serde_yaml::Mapping` so that diffs can be applied to it before it is
//! resolved into column and table specs.

use serde::{Deserialize, Deserializer};
use serde_yaml::{Mapping, Value as Yaml};
use std::collections::BTreeMap;
use std::path::Path;

use returnkit_core::{full_match_regex, CategoryCandidate, ColumnSpec, ColumnType, NumericSpec, StringKind};

use crate::error::SchemaError;

/// A complete base schema
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SchemaDocument {
    /// table -> column -> definition, in declaration order
    pub column_map: Mapping,

    /// table -> profiles that retain it
    #[serde(default)]
    pub profiles: BTreeMap<String, Vec<String>>,
}

impl SchemaDocument {
    /// Load a schema document from file
    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SchemaError::IoError(path.display().to_string(), e.to_string()))?;

        Self::parse(&contents, &path.display().to_string())
    }

    /// Parse a schema document; `source` names it in errors
    pub fn parse(yaml: &str, source: &str) -> Result<Self, SchemaError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| SchemaError::ParseError(source.to_string(), e.to_string()))
    }
}

/// Column definition as written in a schema document
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColumnDefinition {
    #[serde(default)]
    pub string: Option<StringKind>,

    /// `chrono` format string
    #[serde(default)]
    pub date: Option<String>,

    #[serde(default)]
    pub numeric: Option<NumericSpec>,

    #[serde(default)]
    pub category: Option<Vec<CategoryDefinition>>,

    #[serde(default = "default_true", deserialize_with = "flexible_bool")]
    pub canbeblank: bool,

    #[serde(default)]
    pub header_regex: Vec<String>,

    #[serde(default)]
    pub cell_regex: Vec<String>,

    #[serde(default, deserialize_with = "flexible_bool")]
    pub unique_key: bool,

    #[serde(default)]
    pub sort: Option<u32>,

    #[serde(default = "default_true", deserialize_with = "flexible_bool")]
    pub asc: bool,

    #[serde(default)]
    pub exclude: Vec<String>,
}

/// One category value as written in a schema document
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategoryDefinition {
    #[serde(deserialize_with = "scalar_string")]
    pub code: String,

    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub name: Option<String>,

    #[serde(default)]
    pub cell_regex: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl ColumnDefinition {
    /// Resolve into a column spec, compiling every pattern
    pub fn resolve(&self, table: &str, column: &str) -> Result<ColumnSpec, SchemaError> {
        let invalid = |reason: String| SchemaError::InvalidColumn {
            table: table.to_string(),
            column: column.to_string(),
            reason,
        };
        let compile = |pattern: &str, case_insensitive: bool| {
            full_match_regex(pattern, case_insensitive)
                .map_err(|e| invalid(format!("bad pattern '{}': {}", pattern, e)))
        };

        let declared = [
            self.string.is_some(),
            self.date.is_some(),
            self.numeric.is_some(),
            self.category.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();

        if declared != 1 {
            return Err(invalid(format!(
                "expected exactly one of string, date, numeric or category; found {}",
                declared
            )));
        }

        let column_type = if let Some(kind) = self.string {
            let patterns = self
                .cell_regex
                .iter()
                .map(|p| compile(p, false))
                .collect::<Result<Vec<_>, _>>()?;
            if kind == StringKind::Regex && patterns.is_empty() {
                return Err(invalid("string: regex needs at least one cell_regex".to_string()));
            }
            ColumnType::String { kind, patterns }
        } else if let Some(format) = &self.date {
            ColumnType::Date { format: format.clone() }
        } else if let Some(numeric) = &self.numeric {
            ColumnType::Numeric(numeric.clone())
        } else {
            let mut candidates = Vec::new();
            for definition in self.category.iter().flatten() {
                let patterns = definition
                    .cell_regex
                    .iter()
                    .map(|p| compile(p, true))
                    .collect::<Result<Vec<_>, _>>()?;
                let mut candidate = CategoryCandidate::new(definition.code.clone()).with_patterns(patterns);
                if let Some(name) = &definition.name {
                    candidate = candidate.with_name(name.clone());
                }
                candidates.push(candidate);
            }
            ColumnType::Category(candidates)
        };

        let header_patterns = self
            .header_regex
            .iter()
            .map(|p| compile(p, true))
            .collect::<Result<Vec<_>, _>>()?;

        let mut spec = ColumnSpec::new(column, column_type)
            .with_blank_allowed(self.canbeblank)
            .with_header_patterns(header_patterns)
            .with_unique_key(self.unique_key)
            .with_exclude(self.exclude.clone());
        if let Some(priority) = self.sort {
            spec = spec.with_sort(priority, self.asc);
        }

        Ok(spec)
    }
}

/// Diff operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffOp {
    Add,
    Modify,
    Rename,
    Remove,
}

/// One diff entry: `<path>: {type: <op>, value: <value>}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DiffEntry {
    #[serde(rename = "type")]
    pub op: DiffOp,

    #[serde(default)]
    pub value: Yaml,
}

/// An ordered set of diff entries from one file
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDiff {
    /// File name (used in errors)
    pub source: String,

    /// (dot-separated path, entry) in file order
    pub entries: Vec<(String, DiffEntry)>,
}

impl SchemaDiff {
    /// Load a diff document from file
    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SchemaError::IoError(path.display().to_string(), e.to_string()))?;

        Self::parse(&contents, &path.display().to_string())
    }

    /// Parse a diff document; `source` names it in errors
    pub fn parse(yaml: &str, source: &str) -> Result<Self, SchemaError> {
        let mapping: Mapping = serde_yaml::from_str(yaml)
            .map_err(|e| SchemaError::ParseError(source.to_string(), e.to_string()))?;

        let mut entries = Vec::with_capacity(mapping.len());
        for (key, value) in mapping {
            let path = scalar_to_string(&key).ok_or_else(|| SchemaError::InvalidDiff {
                file: source.to_string(),
                path: format!("{:?}", key),
                reason: "path must be a string".to_string(),
            })?;
            let entry: DiffEntry = serde_yaml::from_value(value).map_err(|e| SchemaError::InvalidDiff {
                file: source.to_string(),
                path: path.clone(),
                reason: e.to_string(),
            })?;
            entries.push((path, entry));
        }

        Ok(Self {
            source: source.to_string(),
            entries,
        })
    }
}

/// Render a YAML scalar as a string
pub(crate) fn scalar_to_string(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Number(n) => Some(n.to_string()),
        Yaml::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Yaml::deserialize(deserializer)?;
    scalar_to_string(&value).ok_or_else(|| serde::de::Error::custom("expected a scalar"))
}

fn optional_scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Option::<Yaml>::deserialize(deserializer)? {
        None | Some(Yaml::Null) => Ok(None),
        Some(value) => scalar_to_string(&value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("expected a scalar")),
    }
}

/// YAML 1.2 no longer reads `yes`/`no` as booleans; schema authors still write them
fn flexible_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Yaml::deserialize(deserializer)? {
        Yaml::Bool(b) => Ok(b),
        Yaml::Number(n) => Ok(n.as_f64().map_or(false, |f| f != 0.0)),
        Yaml::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" => Ok(true),
            "no" | "n" | "false" => Ok(false),
            other => Err(serde::de::Error::custom(format!("expected a boolean, got '{}'", other))),
        },
        _ => Err(serde::de::Error::custom("expected a boolean")),
    }
}
