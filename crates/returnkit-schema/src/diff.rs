//! Diff application
//!
//! A diff never mutates the tree it is applied to: every entry rebuilds the
//! mappings along its path and returns a new `column_map`, so the resolved
//! schema of each year stays independently inspectable.
//!
//! Paths are dot-separated and relative to `column_map`:
//! - `add` / `modify`: set the value at the path (parents must exist)
//! - `rename`: rename the last path segment to `value`, keeping its position
//! - `remove`: delete the keys listed in `value` from the path's parent
//!   (the last path segment itself when the list is empty), so a one-level
//!   path removes tables and a two-level path removes columns

use serde_yaml::{Mapping, Value as Yaml};

use crate::document::{scalar_to_string, DiffEntry, DiffOp, SchemaDiff};
use crate::error::SchemaError;

/// Apply every entry of `diff`, in order, to `column_map`
pub fn apply_diff(column_map: &Mapping, diff: &SchemaDiff) -> Result<Mapping, SchemaError> {
    let mut current = column_map.clone();

    for (path, entry) in &diff.entries {
        current = apply_entry(&current, &diff.source, path, entry)?;
        tracing::debug!(file = %diff.source, path = %path, op = ?entry.op, "applied schema diff entry");
    }

    Ok(current)
}

/// Apply one diff entry, returning the rebuilt tree
pub fn apply_entry(
    column_map: &Mapping,
    file: &str,
    path: &str,
    entry: &DiffEntry,
) -> Result<Mapping, SchemaError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(SchemaError::InvalidDiff {
            file: file.to_string(),
            path: path.to_string(),
            reason: "empty path segment".to_string(),
        });
    }

    let Some((last, parents)) = segments.split_last() else {
        return Err(invalid_path(file, path));
    };
    let key = Yaml::String(last.to_string());

    update_at(column_map, parents, file, path, &|parent: &Mapping| {
        match entry.op {
            DiffOp::Add | DiffOp::Modify => {
                let mut updated = parent.clone();
                updated.insert(key.clone(), entry.value.clone());
                Ok(updated)
            }
            DiffOp::Rename => {
                if !parent.contains_key(&key) {
                    return Err(invalid_path(file, path));
                }
                let new_name = scalar_to_string(&entry.value).ok_or_else(|| SchemaError::InvalidDiff {
                    file: file.to_string(),
                    path: path.to_string(),
                    reason: "rename value must be the new name".to_string(),
                })?;
                Ok(parent
                    .iter()
                    .map(|(k, v)| {
                        if *k == key {
                            (Yaml::String(new_name.clone()), v.clone())
                        } else {
                            (k.clone(), v.clone())
                        }
                    })
                    .collect())
            }
            DiffOp::Remove => {
                let listed = removal_keys(&entry.value).ok_or_else(|| SchemaError::InvalidDiff {
                    file: file.to_string(),
                    path: path.to_string(),
                    reason: "remove value must be a list of keys".to_string(),
                })?;
                let removed: Vec<Yaml> = if listed.is_empty() {
                    vec![key.clone()]
                } else {
                    listed.into_iter().map(Yaml::String).collect()
                };

                for k in &removed {
                    if !parent.contains_key(k) {
                        tracing::warn!(file = %file, path = %path, key = ?k, "diff removes a key that does not exist");
                    }
                }

                Ok(parent
                    .iter()
                    .filter(|(k, _)| !removed.contains(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect())
            }
        }
    })
}

fn removal_keys(value: &Yaml) -> Option<Vec<String>> {
    match value {
        Yaml::Null => Some(Vec::new()),
        Yaml::Sequence(items) => items.iter().map(scalar_to_string).collect(),
        scalar => scalar_to_string(scalar).map(|s| vec![s]),
    }
}

fn invalid_path(file: &str, path: &str) -> SchemaError {
    SchemaError::InvalidPath {
        file: file.to_string(),
        path: path.to_string(),
    }
}

/// Rebuild the mappings along `parents`, replacing the innermost one with `f(innermost)`
fn update_at(
    map: &Mapping,
    parents: &[&str],
    file: &str,
    path: &str,
    f: &dyn Fn(&Mapping) -> Result<Mapping, SchemaError>,
) -> Result<Mapping, SchemaError> {
    let Some((head, rest)) = parents.split_first() else {
        return f(map);
    };

    let key = Yaml::String(head.to_string());
    let child = map
        .get(&key)
        .and_then(Yaml::as_mapping)
        .ok_or_else(|| invalid_path(file, path))?;

    let updated = update_at(child, rest, file, path, f)?;

    // insert() on an existing key keeps its position
    let mut rebuilt = map.clone();
    rebuilt.insert(key, Yaml::Mapping(updated));
    Ok(rebuilt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn base() -> Mapping {
        serde_yaml::from_str(
            r#"
header:
  CHILD: {string: alphanumeric}
  SEX: {string: alphanumeric}
  DOB: {date: "%d/%m/%Y"}
episodes:
  CHILD: {string: alphanumeric}
  PL_LA: {string: alphanumeric}
missing:
  CHILD: {string: alphanumeric}
"#,
        )
        .unwrap()
    }

    fn keys(map: &Mapping, table: &str) -> Vec<String> {
        map[table]
            .as_mapping()
            .unwrap()
            .keys()
            .map(|k| k.as_str().unwrap().to_string())
            .collect()
    }

    fn diff(yaml: &str) -> SchemaDiff {
        SchemaDiff::parse(yaml, "test.diff.yml").unwrap()
    }

    #[test]
    fn add_appends_column() {
        let updated = apply_diff(&base(), &diff("header.UPN:\n  type: add\n  value: {string: alphanumeric}\n")).unwrap();
        assert_eq!(keys(&updated, "header"), vec!["CHILD", "SEX", "DOB", "UPN"]);
    }

    #[test]
    fn base_is_not_mutated() {
        let original = base();
        let _ = apply_diff(&original, &diff("header.SEX:\n  type: remove\n  value: []\n")).unwrap();
        assert_eq!(keys(&original, "header"), vec!["CHILD", "SEX", "DOB"]);
    }

    #[test]
    fn modify_nested_key() {
        let updated = apply_diff(&base(), &diff("header.DOB.date:\n  type: modify\n  value: \"%Y-%m-%d\"\n")).unwrap();
        assert_eq!(updated["header"]["DOB"]["date"], Yaml::String("%Y-%m-%d".to_string()));
    }

    #[test]
    fn rename_keeps_position() {
        let updated = apply_diff(&base(), &diff("episodes.PL_LA:\n  type: rename\n  value: PLACE_LA\n")).unwrap();
        assert_eq!(keys(&updated, "episodes"), vec!["CHILD", "PLACE_LA"]);
    }

    #[test]
    fn remove_columns_and_tables() {
        let updated = apply_diff(
            &base(),
            &diff("header.SEX:\n  type: remove\n  value: [SEX, DOB]\nmissing:\n  type: remove\n  value: []\n"),
        )
        .unwrap();

        assert_eq!(keys(&updated, "header"), vec!["CHILD"]);
        assert!(!updated.contains_key("missing"));
        assert!(updated.contains_key("episodes"));
    }

    #[test]
    fn rename_of_missing_path_fails() {
        let err = apply_diff(&base(), &diff("header.UPN:\n  type: rename\n  value: UPN2\n")).unwrap_err();
        assert_eq!(
            err,
            SchemaError::InvalidPath {
                file: "test.diff.yml".to_string(),
                path: "header.UPN".to_string(),
            }
        );
    }

    #[test]
    fn add_under_missing_table_fails() {
        let err = apply_diff(&base(), &diff("reviews.CHILD:\n  type: add\n  value: {string: alphanumeric}\n")).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidPath { .. }));
    }
}
