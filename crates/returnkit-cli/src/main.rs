use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use returnkit_archive::{export_table, export_tables, read_table, Aggregator, Period, SnapshotArchive};
use returnkit_core::{
    find_authority, find_year, Config, DataContainer, DedupMode, ErrorEntry, ErrorKind, ErrorReport, SourceFormat,
};
use returnkit_episodes::EpisodeRepairEngine;
use returnkit_pipeline::clean_tabular_file;
use returnkit_schema::{SchemaCatalog, SchemaFiles};

/// ReturnKit - cleaning, archiving and repair of statutory data returns
#[derive(Parser)]
#[command(name = "returnkit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: returnkit.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Where to write the session error report
    #[arg(long, global = true, default_value = "errors.csv")]
    report: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean submitted files into schema-conformant tables
    Clean {
        /// Files to clean
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Reporting year (default: taken from the file name)
        #[arg(short, long)]
        year: Option<u16>,

        /// Authority code (default: taken from the file path)
        #[arg(short, long)]
        authority: Option<String>,

        /// Output directory for cleaned tables
        #[arg(short, long, default_value = "cleaned")]
        output: PathBuf,
    },

    /// Add a directory of cleaned tables to the archive as a new snapshot
    ArchiveAdd {
        /// Directory of cleaned `<table>.csv` files
        dir: PathBuf,

        /// Authority code
        #[arg(short, long)]
        authority: String,

        /// Period, e.g. 2023, 2023-02, 2023-t1, 2023-02-r1
        #[arg(short, long)]
        period: String,
    },

    /// Export the combined view of an authority's snapshots
    ArchiveCurrent {
        /// Authority code
        #[arg(short, long)]
        authority: String,

        /// Deduplication mode: E (each step), A (after all) or N (never)
        #[arg(short, long)]
        mode: Option<DedupMode>,

        /// Schema year (default: latest available)
        #[arg(short, long)]
        year: Option<u16>,

        /// Export profile (default: from config)
        #[arg(long)]
        profile: Option<String>,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Combine exported files into one table per table id
    Aggregate {
        /// Exported files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Deduplicate the combined tables
        #[arg(long)]
        dedup: bool,

        /// Schema year (default: latest available)
        #[arg(short, long)]
        year: Option<u16>,

        /// File name prefix of the combined tables
        #[arg(long, default_value = "combined")]
        prefix: String,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Close open episodes and realign overlapping ones
    RepairEpisodes {
        /// Episodes table (CSV)
        file: PathBuf,

        /// Repaired episodes table (CSV)
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path).with_context(|| format!("Failed to load {}", config_path.display()))?
    } else if Path::new("returnkit.toml").exists() {
        Config::from_file(Path::new("returnkit.toml")).context("Failed to load returnkit.toml")?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    init_tracing(&config, cli.verbose);
    tracing::debug!(dataset = %config.dataset, schema_dir = %config.schema_dir.display(), "loaded config");

    let mut report = ErrorReport::new();

    let result = match cli.command {
        Commands::Clean { files, year, authority, output } => {
            clean_command(&config, &files, year, authority.as_deref(), &output, &mut report)
        }
        Commands::ArchiveAdd { dir, authority, period } => {
            archive_add_command(&config, &dir, &authority, &period, &mut report)
        }
        Commands::ArchiveCurrent { authority, mode, year, profile, output } => archive_current_command(
            &config,
            &authority,
            mode.unwrap_or(config.dedup_mode),
            year,
            profile.or_else(|| config.export_profile.clone()),
            &output,
            &mut report,
        ),
        Commands::Aggregate { files, dedup, year, prefix, output } => {
            aggregate_command(&config, &files, dedup, year, &prefix, &output, &mut report)
        }
        Commands::RepairEpisodes { file, output } => repair_episodes_command(&file, &output),
    };

    if !report.is_empty() {
        report
            .save_csv(&cli.report)
            .with_context(|| format!("Failed to write {}", cli.report.display()))?;
        print_report_summary(&report, &cli.report);
    }

    result
}

/// `RUST_LOG` wins, then the config's `log_filter`, then `info` (`debug` with -v)
fn init_tracing(config: &Config, verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let fallback = config
        .log_filter
        .clone()
        .unwrap_or_else(|| if verbose { "debug" } else { "info" }.to_string());

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Build the catalog for `year`, recording schema failures in the report
fn load_catalog(config: &Config, year: u16, report: &mut ErrorReport) -> Result<SchemaCatalog> {
    let schema_dir = config.resolve(&config.schema_dir);
    SchemaCatalog::build(&config.dataset, year, &schema_dir).map_err(|e| {
        report.add_entry(ErrorEntry::new(ErrorKind::SchemaError, e.to_string()));
        anyhow::Error::new(e).context(format!("Failed to load {} schema for {}", config.dataset, year))
    })
}

/// Latest year with a base schema or diff
fn latest_schema_year(config: &Config) -> Result<u16> {
    let schema_dir = config.resolve(&config.schema_dir);
    let files = SchemaFiles::discover(&schema_dir, &config.dataset)
        .with_context(|| format!("Failed to list schemas in {}", schema_dir.display()))?;

    files
        .bases
        .keys()
        .chain(files.diffs.keys())
        .max()
        .copied()
        .ok_or_else(|| anyhow::anyhow!("No {} schemas found in {}", config.dataset, schema_dir.display()))
}

/// Clean command - one cleaned table set per file
fn clean_command(
    config: &Config,
    files: &[PathBuf],
    year: Option<u16>,
    authority: Option<&str>,
    output: &Path,
    report: &mut ErrorReport,
) -> Result<()> {
    if config.source_format == SourceFormat::Xml {
        anyhow::bail!("The clean command reads tabular files only; set source_format = \"tabular\"");
    }

    let mut cleaned_files = 0;

    for path in files {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        if config.is_file_ignored(&file_name) {
            tracing::info!(file = %file_name, "ignored by config");
            continue;
        }

        let year = match year.map(Ok).unwrap_or_else(|| find_year(&path.to_string_lossy())) {
            Ok(year) => year,
            Err(e) => {
                report.add_entry(ErrorEntry::new(ErrorKind::MissingYear, e.to_string()).with_filename(&file_name));
                eprintln!("  {} {}: {}", "SKIP".yellow().bold(), file_name, e);
                continue;
            }
        };

        let prefix = match authority {
            Some(code) => code.to_string(),
            None if config.authorities.is_empty() => String::new(),
            None => match find_authority(path, &config.authorities) {
                Ok(found) => found.code.clone(),
                Err(e) => {
                    report.add_entry(
                        ErrorEntry::new(ErrorKind::MissingAuthority, e.to_string()).with_filename(&file_name),
                    );
                    eprintln!("  {} {}: {}", "SKIP".yellow().bold(), file_name, e);
                    continue;
                }
            },
        };

        let catalog = load_catalog(config, year, report)?;

        let (source, cleaned) = match clean_tabular_file(path, &catalog) {
            Ok(result) => result,
            Err(e) => {
                report.add_entry(e.to_entry(&file_name));
                eprintln!("  {} {}: {}", "FAIL".red().bold(), file_name, e);
                continue;
            }
        };

        let written = export_tables(&cleaned.data, output, &prefix)
            .with_context(|| format!("Failed to export cleaned tables of {}", source.name))?;

        println!(
            "  {} {} ({}) -> {} tables, {} rows, {} errors",
            "✓".green(),
            source.name,
            year,
            written.len(),
            cleaned.data.row_count(),
            cleaned.errors.len()
        );
        report.add_errors(cleaned.errors);
        cleaned_files += 1;
    }

    println!("{} {} of {} files", "Cleaned".bold(), cleaned_files, files.len());
    Ok(())
}

/// CSV files directly inside `dir`, sorted by name
fn csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        let is_csv = entry
            .path()
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"));
        if entry.file_type().is_file() && is_csv {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Archive-add command - store cleaned tables as a snapshot
fn archive_add_command(
    config: &Config,
    dir: &Path,
    authority: &str,
    period: &str,
    report: &mut ErrorReport,
) -> Result<()> {
    let period: Period = period.parse().with_context(|| format!("Invalid period '{}'", period))?;
    let catalog = load_catalog(config, period.year(), report)?;

    let files = csv_files(dir)?;
    let (data, errors) = Aggregator::new(&catalog)
        .combine(&files, false)
        .with_context(|| format!("Failed to read cleaned tables from {}", dir.display()))?;
    report.add_errors(errors);

    let archive = SnapshotArchive::new(config.resolve(&config.archive_root), &config.dataset, &catalog)
        .with_row_addressable(config.source_format == SourceFormat::Tabular);
    let id = archive
        .add(&data, authority, period)
        .with_context(|| format!("Failed to archive {}", dir.display()))?;

    println!(
        "{} {} ({} tables, {} rows)",
        "Added snapshot".green().bold(),
        id,
        data.len(),
        data.row_count()
    );
    Ok(())
}

/// Archive-current command - export the combined view
fn archive_current_command(
    config: &Config,
    authority: &str,
    mode: DedupMode,
    year: Option<u16>,
    profile: Option<String>,
    output: &Path,
    report: &mut ErrorReport,
) -> Result<()> {
    let year = match year {
        Some(year) => year,
        None => latest_schema_year(config)?,
    };
    let catalog = load_catalog(config, year, report)?;

    let archive = SnapshotArchive::new(config.resolve(&config.archive_root), &config.dataset, &catalog)
        .with_row_addressable(config.source_format == SourceFormat::Tabular);
    let snapshots = archive.list_snapshots(authority);

    let (written, errors) = archive
        .export_current(authority, mode, output, profile.as_deref())
        .with_context(|| format!("Failed to export current view of {}", authority))?;

    println!(
        "{} {} snapshots of {} (mode {}), {} duplicates removed",
        "Combined".bold(),
        snapshots.len(),
        authority,
        mode,
        errors.len()
    );
    for path in &written {
        println!("  {} {}", "→".cyan(), path.display());
    }

    report.add_errors(errors);
    Ok(())
}

/// Aggregate command - concatenate exported files per table
fn aggregate_command(
    config: &Config,
    files: &[PathBuf],
    dedup: bool,
    year: Option<u16>,
    prefix: &str,
    output: &Path,
    report: &mut ErrorReport,
) -> Result<()> {
    let year = match year {
        Some(year) => year,
        None => latest_schema_year(config)?,
    };
    let catalog = load_catalog(config, year, report)?;

    let aggregator = Aggregator::new(&catalog).with_row_addressable(config.source_format == SourceFormat::Tabular);
    let (combined, errors): (DataContainer, _) = aggregator.combine(files, dedup).context("Failed to aggregate")?;
    let written = aggregator
        .export(&combined, output, prefix)
        .with_context(|| format!("Failed to write to {}", output.display()))?;

    println!(
        "{} {} files into {} tables ({} rows, {} duplicates removed)",
        "Aggregated".bold(),
        files.len(),
        written.len(),
        combined.row_count(),
        errors.len()
    );

    report.add_errors(errors);
    Ok(())
}

/// Repair-episodes command
fn repair_episodes_command(file: &Path, output: &Path) -> Result<()> {
    let table = read_table(file, None).with_context(|| format!("Failed to read {}", file.display()))?;
    let outcome = EpisodeRepairEngine::new()
        .repair(&table)
        .with_context(|| format!("Cannot repair {}", file.display()))?;

    export_table(output, &outcome.table).with_context(|| format!("Failed to write {}", output.display()))?;

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Episode Repair".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();
    println!("{} {}", "Episodes:".bold(), outcome.summary.episodes);

    if outcome.summary.rule_counts.is_empty() {
        println!("{}", "✓ No episodes needed repair".green());
    } else {
        for (rule, count) in &outcome.summary.rule_counts {
            println!("  {:<8} {}", rule.yellow(), count);
        }
    }

    println!();
    println!("{} {}", "Written to:".green(), output.display());
    tracing::debug!(summary = %serde_json::to_string(&outcome.summary).unwrap_or_default(), "repair summary");
    Ok(())
}

/// Print the per-kind error counts of the session
fn print_report_summary(report: &ErrorReport, path: &Path) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Error Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();
    println!("{} {}", "Session:".bold(), report.session_id);
    println!("{} {} in {} files", "Entries:".bold(), report.summary.total, report.summary.files);

    for (kind, count) in &report.summary.by_kind {
        let label = match kind {
            ErrorKind::StreamError | ErrorKind::SchemaError => kind.as_str().red().bold(),
            ErrorKind::DuplicateRemoval => kind.as_str().cyan(),
            _ => kind.as_str().yellow(),
        };
        println!("  [{}] {}", label, count);
    }

    println!();
    println!("{} {}", "Report saved to:".green(), path.display());
    println!("{}", "=".repeat(60).bright_blue());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_archive_current() {
        let cli = Cli::try_parse_from([
            "returnkit",
            "archive-current",
            "--authority",
            "BAR",
            "--mode",
            "e",
            "--output",
            "out",
        ])
        .unwrap();

        match cli.command {
            Commands::ArchiveCurrent { authority, mode, .. } => {
                assert_eq!(authority, "BAR");
                assert_eq!(mode, Some(DedupMode::Each));
            }
            _ => panic!("expected archive-current"),
        }
    }

    #[test]
    fn csv_files_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b_header.csv"), "CHILD\n").unwrap();
        std::fs::write(dir.path().join("a_episodes.CSV"), "CHILD\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let names: Vec<String> = csv_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a_episodes.CSV", "b_header.csv"]);
    }
}
