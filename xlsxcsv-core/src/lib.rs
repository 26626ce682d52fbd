//! # xlsxcsv-core
//!
//! Streaming conversion of xlsx workbooks into one CSV file per worksheet.
//!
//! Worksheets are read as a forward-only XML stream and written row by row, so
//! memory use is bounded by the shared-string table and a single row rather
//! than by sheet size. Independent worksheets of a workbook convert in
//! parallel.
//!
//! ```no_run
//! use std::path::Path;
//! use xlsxcsv_core::{convert_workbook, ConvertOptions, FailurePolicy, Package, SheetSelection};
//!
//! let package = Package::open("book.xlsx").unwrap();
//! let report = convert_workbook(
//!     &package,
//!     &SheetSelection::default(),
//!     ConvertOptions::default().with_indexed(true),
//!     Path::new("book"),
//!     FailurePolicy::Abort,
//! )
//! .unwrap();
//! println!("{} rows written", report.rows_written());
//! ```

pub mod catalog;
pub mod error;
pub mod format;
pub mod number_format;
pub mod package;
pub mod shared_strings;
pub mod utils;
pub mod workbook;
pub mod worksheet;
pub mod writer;
mod xml;

pub use catalog::{SheetCatalog, SheetDescriptor, SheetEntry, SheetSelection, SheetState};
pub use error::{Result, XlsxCsvError};
pub use format::{CellType, ValueFormatter, EXCEL_ERRORS};
pub use number_format::{FormatKind, NumberFormatTable};
pub use package::Package;
pub use shared_strings::SharedStringTable;
pub use utils::{
    column_to_letter, coordinate_from_row_col, decode_column, decode_row, parse_u32_bytes,
    sanitize_file_name, CellAddress, RangeAddress, MAX_COLUMN, MAX_ROW,
};
pub use workbook::{
    convert_workbook, ConversionReport, FailurePolicy, Parallelism, ProgressCallback,
    SheetOutcome, WorkbookContext, WorkbookConverter,
};
pub use worksheet::{ConvertOptions, SheetStats, WorksheetConverter};
pub use writer::{escape_csv, CsvWriter};
