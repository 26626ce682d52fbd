//! Workbook-level state and conversion of every selected sheet.

#[cfg(feature = "fast-hash")]
use hashbrown::HashMap;
#[cfg(not(feature = "fast-hash"))]
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rayon::prelude::*;
use zip::result::ZipError;

use crate::catalog::{SheetCatalog, SheetDescriptor, SheetSelection};
use crate::error::{Result, XlsxCsvError};
use crate::number_format::NumberFormatTable;
use crate::package::Package;
use crate::shared_strings::SharedStringTable;
use crate::utils::sanitize_file_name;
use crate::worksheet::{ConvertOptions, SheetStats, WorksheetConverter};

/// What to do with the remaining sheets once one fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Return the first failure as the result of the whole run.
    #[default]
    Abort,
    /// Record the failure in the report and carry on.
    Continue,
}

/// How independent sheets are scheduled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    /// Several sheets convert on the rayon pool; a single sheet stays on the
    /// calling thread.
    #[default]
    Parallel,
}

/// Read-only state every worksheet conversion shares.
#[derive(Clone, Debug, Default)]
pub struct WorkbookContext {
    pub shared_strings: SharedStringTable,
    pub number_formats: NumberFormatTable,
    pub catalog: SheetCatalog,
}

impl WorkbookContext {
    /// Read the workbook, shared-strings and styles parts once. Both tables are
    /// optional; the workbook part is not.
    pub fn load(package: &Package) -> Result<Self> {
        let mut archive = package.archive()?;

        let catalog = SheetCatalog::load(BufReader::new(archive.by_name(package.workbook_path())?))?;

        let shared_strings = match package.shared_strings_path() {
            Some(path) => SharedStringTable::load(BufReader::new(archive.by_name(path)?))?,
            None => {
                debug!("Workbook has no shared strings part");
                SharedStringTable::missing()
            }
        };

        let number_formats = match package.styles_path() {
            Some(path) => NumberFormatTable::load(BufReader::new(archive.by_name(path)?))?,
            None => NumberFormatTable::new(),
        };

        Ok(WorkbookContext {
            shared_strings,
            number_formats,
            catalog,
        })
    }
}

/// Result of converting one selected sheet.
#[derive(Debug)]
pub struct SheetOutcome {
    pub name: String,
    pub rename: String,
    pub output_path: PathBuf,
    pub result: Result<SheetStats>,
}

impl SheetOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn stats(&self) -> Option<&SheetStats> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&XlsxCsvError> {
        self.result.as_ref().err()
    }

    fn into_result(self) -> Result<SheetOutcome> {
        let SheetOutcome {
            name,
            rename,
            output_path,
            result,
        } = self;
        let stats = result?;
        Ok(SheetOutcome {
            name,
            rename,
            output_path,
            result: Ok(stats),
        })
    }
}

/// Per-sheet outcomes of a workbook conversion, in selection order.
#[derive(Debug, Default)]
pub struct ConversionReport {
    pub sheets: Vec<SheetOutcome>,
    pub elapsed: Duration,
}

impl ConversionReport {
    pub fn failures(&self) -> impl Iterator<Item = &SheetOutcome> {
        self.sheets.iter().filter(|s| !s.is_ok())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn rows_written(&self) -> u64 {
        self.sheets
            .iter()
            .filter_map(SheetOutcome::stats)
            .map(|s| u64::from(s.rows_written))
            .sum()
    }
}

/// Progress sink: sheet name and its running counters.
pub type ProgressCallback<'a> = &'a (dyn Fn(&str, &SheetStats) + Sync);

/// Converts the selected sheets of a package into one CSV file each.
///
/// # Example
/// ```no_run
/// use std::path::Path;
/// use xlsxcsv_core::{ConvertOptions, FailurePolicy, Package, SheetSelection, WorkbookConverter};
///
/// let package = Package::open("report.xlsx").unwrap();
/// let report = WorkbookConverter::new(&package)
///     .selection(SheetSelection::new().with_names(["Summary"]))
///     .options(ConvertOptions::new().with_remove_empty_rows(true))
///     .failure_policy(FailurePolicy::Continue)
///     .run(Path::new("out"))
///     .unwrap();
///
/// for sheet in &report.sheets {
///     println!("{} -> {}", sheet.name, sheet.output_path.display());
/// }
/// ```
pub struct WorkbookConverter<'a> {
    package: &'a Package,
    selection: SheetSelection,
    options: ConvertOptions,
    policy: FailurePolicy,
    parallelism: Parallelism,
    progress: Option<ProgressCallback<'a>>,
}

impl<'a> WorkbookConverter<'a> {
    pub fn new(package: &'a Package) -> Self {
        WorkbookConverter {
            package,
            selection: SheetSelection::default(),
            options: ConvertOptions::default(),
            policy: FailurePolicy::default(),
            parallelism: Parallelism::default(),
            progress: None,
        }
    }

    pub fn selection(mut self, selection: SheetSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn options(mut self, options: ConvertOptions) -> Self {
        self.options = options;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn progress(mut self, progress: ProgressCallback<'a>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Convert every selected sheet into `output_dir`, which must exist.
    ///
    /// Workbook-level failures (unreadable parts, unknown sheet names, a
    /// rename count that does not match) are returned before any file is
    /// written. Per-sheet failures follow the failure policy.
    pub fn run(&self, output_dir: &Path) -> Result<ConversionReport> {
        let started = Instant::now();

        let context = WorkbookContext::load(self.package)?;
        let descriptors = context.catalog.select(&self.selection)?;
        info!(
            "Converting {} sheet(s) into {}",
            descriptors.len(),
            output_dir.display()
        );

        let parallel = self.parallelism == Parallelism::Parallel && descriptors.len() > 1;
        let groups = if parallel {
            output_groups(&descriptors, output_dir)
        } else {
            vec![(0..descriptors.len()).collect()]
        };

        // Sheets sharing an output file convert one after another, in
        // selection order, so the last one wins.
        let convert_group = |group: &Vec<usize>| -> Result<Vec<(usize, SheetOutcome)>> {
            let mut outcomes = Vec::with_capacity(group.len());
            for &index in group {
                let outcome = self.convert_sheet(&context, &descriptors[index], output_dir);
                let outcome = match self.policy {
                    FailurePolicy::Abort => outcome.into_result()?,
                    FailurePolicy::Continue => outcome,
                };
                outcomes.push((index, outcome));
            }
            Ok(outcomes)
        };

        let converted = if groups.len() > 1 {
            groups.par_iter().map(convert_group).collect::<Result<Vec<_>>>()?
        } else {
            groups.iter().map(convert_group).collect::<Result<Vec<_>>>()?
        };

        let mut sheets: Vec<(usize, SheetOutcome)> = converted.into_iter().flatten().collect();
        sheets.sort_by_key(|(index, _)| *index);
        let sheets = sheets.into_iter().map(|(_, outcome)| outcome).collect();

        Ok(ConversionReport {
            sheets,
            elapsed: started.elapsed(),
        })
    }

    fn convert_sheet(
        &self,
        context: &WorkbookContext,
        descriptor: &SheetDescriptor,
        output_dir: &Path,
    ) -> SheetOutcome {
        let output_path = output_path(output_dir, descriptor);
        let result = self
            .write_sheet(context, descriptor, &output_path)
            .map_err(|e| e.in_sheet(&descriptor.name));

        match &result {
            Ok(stats) => info!(
                "Sheet '{}': {} rows written, {} rows covered in {:.2}s -> {}",
                descriptor.name,
                stats.rows_written,
                stats.rows_covered,
                stats.elapsed.as_secs_f64(),
                output_path.display()
            ),
            Err(e) if self.policy == FailurePolicy::Continue => {
                warn!("Skipping sheet '{}': {}", descriptor.name, e)
            }
            Err(_) => {}
        }

        SheetOutcome {
            name: descriptor.name.clone(),
            rename: descriptor.rename.clone(),
            output_path,
            result,
        }
    }

    fn write_sheet(
        &self,
        context: &WorkbookContext,
        descriptor: &SheetDescriptor,
        output_path: &Path,
    ) -> Result<SheetStats> {
        let part = self
            .package
            .locate_worksheet(&descriptor.relationship_id, descriptor.sheet_id)
            .ok_or_else(|| {
                XlsxCsvError::InvalidFormat(format!(
                    "relationship '{}' does not point to a worksheet part",
                    descriptor.relationship_id
                ))
            })?;
        debug!("Sheet '{}' reads part {}", descriptor.name, part);

        let mut archive = self.package.archive()?;
        let entry = archive.by_name(&part).map_err(|e| match e {
            ZipError::FileNotFound => {
                XlsxCsvError::InvalidFormat(format!("worksheet part '{}' not found in package", part))
            }
            other => other.into(),
        })?;

        let output = File::create(output_path)?;
        let report = |stats: &SheetStats| {
            if let Some(progress) = self.progress {
                progress(&descriptor.name, stats);
            }
        };

        WorksheetConverter::new(
            &descriptor.name,
            &context.shared_strings,
            &context.number_formats,
            self.options,
        )
        .with_progress(&report)
        .convert(BufReader::new(entry), output)
    }
}

fn output_path(output_dir: &Path, descriptor: &SheetDescriptor) -> PathBuf {
    output_dir.join(sanitize_file_name(&format!("{}.csv", descriptor.rename)))
}

/// Indices of `descriptors` grouped by output file, groups ordered by first
/// occurrence. Paths are compared case-insensitively.
fn output_groups(descriptors: &[SheetDescriptor], output_dir: &Path) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::with_capacity(descriptors.len());
    let mut by_path: HashMap<String, usize> = HashMap::with_capacity(descriptors.len());

    for (index, descriptor) in descriptors.iter().enumerate() {
        let key = output_path(output_dir, descriptor)
            .to_string_lossy()
            .to_lowercase();
        match by_path.get(&key) {
            Some(&group) => {
                warn!(
                    "Sheet '{}' writes the same file as sheet '{}'; the later sheet wins",
                    descriptor.name, descriptors[groups[group][0]].name
                );
                groups[group].push(index);
            }
            None => {
                by_path.insert(key, groups.len());
                groups.push(vec![index]);
            }
        }
    }
    groups
}

/// Convert the selected sheets of `package` into `output_dir` on the default
/// schedule.
pub fn convert_workbook(
    package: &Package,
    selection: &SheetSelection,
    options: ConvertOptions,
    output_dir: &Path,
    policy: FailurePolicy,
) -> Result<ConversionReport> {
    WorkbookConverter::new(package)
        .selection(selection.clone())
        .options(options)
        .failure_policy(policy)
        .run(output_dir)
}
