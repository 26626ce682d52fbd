use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;
use xlsxcsv_core::{
    ConversionReport, ConvertOptions, FailurePolicy, Package, Parallelism, SheetSelection,
    SheetStats, WorkbookConverter,
};

/// Rows between progress lines at debug level.
const PROGRESS_EVERY: u32 = 50_000;

/// Convert the worksheets of an xlsx workbook into CSV files, one per sheet.
///
/// Rows and cells the workbook leaves out are written as blanks, so every
/// line of a sheet has the same number of fields.
#[derive(Parser, Debug)]
#[command(name = "xlsxcsv", version)]
struct Args {
    /// Workbook to convert.
    file: PathBuf,

    /// Output directory. Defaults to a directory named after the workbook,
    /// next to it.
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Sheets to convert, in order. Defaults to every visible sheet.
    #[arg(short, long, value_name = "NAME", num_args = 1..)]
    sheets: Vec<String>,

    /// Output file names for the converted sheets, paired by position.
    #[arg(short, long, value_name = "NAME", num_args = 1..)]
    rename: Vec<String>,

    /// Prepend a quoted row number column. Numbers stay contiguous when rows
    /// are removed.
    #[arg(short, long)]
    indexed: bool,

    /// Include hidden and very hidden sheets.
    #[arg(long)]
    hidden: bool,

    /// Write Excel error values such as #N/A as empty cells.
    #[arg(long)]
    null_errors: bool,

    /// Leave out rows whose every cell is empty.
    #[arg(long)]
    remove_empty_rows: bool,

    /// Keep converting the remaining sheets when one fails.
    #[arg(long)]
    continue_on_error: bool,

    /// Convert sheets one at a time.
    #[arg(long)]
    sequential: bool,
}

impl Args {
    fn selection(&self) -> SheetSelection {
        SheetSelection::new()
            .with_names(self.sheets.iter().cloned())
            .with_renames(self.rename.iter().cloned())
            .with_include_hidden(self.hidden)
    }

    fn options(&self) -> ConvertOptions {
        ConvertOptions::new()
            .with_indexed(self.indexed)
            .with_treat_errors_as_empty(self.null_errors)
            .with_remove_empty_rows(self.remove_empty_rows)
    }

    fn output_dir(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_output_dir(&self.file))
    }
}

fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();

    match run(&args) {
        Ok(report) if !report.has_failures() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins; otherwise info. Records from the `log` facade are
/// forwarded to the same subscriber.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(filter)
        .init();
}

fn run(args: &Args) -> Result<ConversionReport> {
    validate_input(&args.file)?;

    let output_dir = args.output_dir();
    fs::create_dir_all(&output_dir).with_context(|| {
        format!("Failed to create output directory {}", output_dir.display())
    })?;

    let package = Package::open(&args.file)
        .with_context(|| format!("Failed to open workbook {}", args.file.display()))?;

    let policy = if args.continue_on_error {
        FailurePolicy::Continue
    } else {
        FailurePolicy::Abort
    };
    let parallelism = if args.sequential {
        Parallelism::Sequential
    } else {
        Parallelism::Parallel
    };
    let progress = |sheet: &str, stats: &SheetStats| {
        if stats.rows_covered % PROGRESS_EVERY == 0 {
            debug!("{}: {:.1}% ({} rows)", sheet, stats.percent(), stats.rows_covered);
        }
    };

    let report = WorkbookConverter::new(&package)
        .selection(args.selection())
        .options(args.options())
        .failure_policy(policy)
        .parallelism(parallelism)
        .progress(&progress)
        .run(&output_dir)
        .with_context(|| format!("Failed to convert {}", args.file.display()))?;

    for failed in report.failures() {
        if let Some(e) = failed.error() {
            error!("Sheet '{}' was not converted: {}", failed.name, e);
        }
    }
    info!(
        "Converted {} of {} sheet(s), {} rows written in {:.2}s",
        report.sheets.len() - report.failures().count(),
        report.sheets.len(),
        report.rows_written(),
        report.elapsed.as_secs_f64()
    );

    Ok(report)
}

fn validate_input(file: &Path) -> Result<()> {
    if !file.is_file() {
        bail!("Input file {} does not exist", file.display());
    }
    let is_xlsx = file
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"));
    if !is_xlsx {
        bail!("Input file {} is not an .xlsx workbook", file.display());
    }
    Ok(())
}

/// `<dir>/<stem>` for an input of `<dir>/<stem>.xlsx`.
fn default_output_dir(file: &Path) -> PathBuf {
    let stem = file.file_stem().unwrap_or_else(|| "output".as_ref());
    match file.parent() {
        Some(parent) => parent.join(stem),
        None => PathBuf::from(stem),
    }
}
