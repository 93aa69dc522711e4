//! Snapshot archive and aggregator tests on a temporary directory

use pretty_assertions::assert_eq;

use returnkit_archive::{Aggregator, Period, SnapshotArchive};
use returnkit_core::{DataContainer, DedupMode, ErrorKind, Record, Table, Value};
use returnkit_schema::{SchemaCatalog, SchemaDocument};

// =============================================================================
// Helper Functions
// =============================================================================

const SCHEMA: &str = r#"
column_map:
  header:
    CHILD:
      string: alphanumeric
      unique_key: true
    SEX:
      string: alphanumeric
      exclude: [PAN]
    YEAR:
      numeric:
        type: integer
      sort: 0
      asc: false
  episodes:
    CHILD:
      string: alphanumeric
    DECOM:
      date: "%d/%m/%Y"
"#;

fn catalog() -> SchemaCatalog {
    let document = SchemaDocument::parse(SCHEMA, "ssda903_schema_2023.yml").unwrap();
    SchemaCatalog::from_documents(2023, 2023, &document, &[]).unwrap()
}

fn header(rows: &[(&str, &str, i64)]) -> DataContainer {
    let rows: Vec<Record> = rows
        .iter()
        .map(|(child, sex, year)| {
            Record::from([
                ("CHILD".to_string(), Value::text(*child)),
                ("SEX".to_string(), Value::text(*sex)),
                ("YEAR".to_string(), Value::Integer(*year)),
            ])
        })
        .collect();

    let mut data = DataContainer::new();
    data.insert(
        "header",
        Table::new(vec!["CHILD".to_string(), "SEX".to_string(), "YEAR".to_string()]).with_rows(rows),
    );
    data
}

// =============================================================================
// Snapshot archive
// =============================================================================

#[test]
fn add_then_current_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog();
    let archive = SnapshotArchive::new(dir.path(), "ssda903", &catalog);

    let mut data = header(&[("A", "1", 2023), ("B", "2", 2023)]);
    data.insert("unknown", Table::new(vec!["X".to_string()]));

    let id = archive.add(&data, "BAR", Period::Year(2023)).unwrap();
    assert_eq!(id.seq, 1);
    assert!(dir.path().join("BAR/ssda903.2023.000001/header.csv").is_file());
    assert!(!dir.path().join("BAR/ssda903.2023.000001/unknown.csv").exists());

    let (current, errors) = archive.current("BAR", DedupMode::Never).unwrap();
    assert!(errors.is_empty());
    assert_eq!(current.table_ids(), vec!["header"]);
    assert_eq!(current.get("header"), data.normalised(&catalog).get("header"));
}

#[test]
fn every_add_is_a_new_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog();
    let archive = SnapshotArchive::new(dir.path(), "ssda903", &catalog);

    archive.add(&header(&[("A", "1", 2023)]), "BAR", Period::Year(2023)).unwrap();
    archive.add(&header(&[("A", "1", 2023)]), "BAR", Period::Year(2023)).unwrap();
    archive.add(&header(&[("C", "1", 2022)]), "BAR", Period::Year(2022)).unwrap();

    let snapshots = archive.list_snapshots("BAR");
    let listed: Vec<(String, u32)> = snapshots.iter().map(|s| (s.period.to_string(), s.seq)).collect();
    assert_eq!(
        listed,
        vec![("2022".to_string(), 3), ("2023".to_string(), 1), ("2023".to_string(), 2)]
    );

    archive.delete_snapshots(&snapshots[..1]).unwrap();
    assert_eq!(archive.list_snapshots("BAR").len(), 2);
}

#[test]
fn current_deduplicates_after_all() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog();
    let archive = SnapshotArchive::new(dir.path(), "ssda903", &catalog);

    archive
        .add(&header(&[("A", "1", 2022), ("B", "2", 2022)]), "BAR", Period::Year(2022))
        .unwrap();
    archive
        .add(&header(&[("A", "2", 2023), ("C", "1", 2023)]), "BAR", Period::Year(2023))
        .unwrap();

    let (current, errors) = archive.current("BAR", DedupMode::AfterAll).unwrap();
    let table = current.get("header").unwrap();

    let kept: Vec<(String, i64)> = table
        .rows
        .iter()
        .map(|r| (r["CHILD"].render(), r["YEAR"].as_i64().unwrap()))
        .collect();
    assert_eq!(
        kept,
        vec![("A".to_string(), 2023), ("C".to_string(), 2023), ("B".to_string(), 2022)]
    );
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.count(ErrorKind::DuplicateRemoval), 1);

    let (_, each_errors) = archive.current("BAR", DedupMode::Each).unwrap();
    assert_eq!(each_errors.len(), 1);

    let (never, never_errors) = archive.current("BAR", DedupMode::Never).unwrap();
    assert_eq!(never.get("header").unwrap().len(), 4);
    assert!(never_errors.is_empty());
}

#[test]
fn missing_authority_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog();
    let archive = SnapshotArchive::new(dir.path(), "ssda903", &catalog);

    assert!(archive.list_snapshots("NOPE").is_empty());
    let (current, errors) = archive.current("NOPE", DedupMode::AfterAll).unwrap();
    assert!(current.is_empty());
    assert!(errors.is_empty());
}

#[test]
fn export_current_applies_profile() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let catalog = catalog();
    let archive = SnapshotArchive::new(dir.path(), "ssda903", &catalog);

    archive.add(&header(&[("A", "1", 2023)]), "BAR", Period::Year(2023)).unwrap();
    let (written, _) = archive
        .export_current("BAR", DedupMode::AfterAll, out.path(), Some("PAN"))
        .unwrap();

    assert_eq!(written, vec![out.path().join("BAR_header.csv")]);
    let contents = std::fs::read_to_string(&written[0]).unwrap();
    assert_eq!(contents, "CHILD,YEAR\nA,2023\n");
}

// =============================================================================
// Aggregator
// =============================================================================

#[test]
fn aggregate_exported_files() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("BAR_header.csv");
    let second = dir.path().join("ENF_header.csv");
    let stray = dir.path().join("notes.csv");
    std::fs::write(&first, "CHILD,SEX,YEAR\nA,1,2022\n").unwrap();
    std::fs::write(&second, "YEAR,CHILD\n2023,A\n2023,B\n").unwrap();
    std::fs::write(&stray, "X\n1\n").unwrap();

    let catalog = catalog();
    let aggregator = Aggregator::new(&catalog);
    let files = vec![first, second, stray];

    let (combined, errors) = aggregator.combine(&files, false).unwrap();
    assert_eq!(combined.get("header").unwrap().len(), 3);
    assert!(errors.is_empty());

    let (deduplicated, errors) = aggregator.combine(&files, true).unwrap();
    let header = deduplicated.get("header").unwrap();
    assert_eq!(header.len(), 2);
    assert_eq!(header.value(0, "YEAR"), &Value::Integer(2023));
    assert_eq!(header.value(0, "SEX"), &Value::Blank);
    assert_eq!(errors.iter().next().unwrap().row_number, Some(1));

    let out = tempfile::tempdir().unwrap();
    let written = aggregator.export(&deduplicated, out.path(), "all").unwrap();
    assert_eq!(written, vec![out.path().join("all_header.csv")]);
}
