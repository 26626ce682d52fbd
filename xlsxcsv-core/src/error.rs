//! Error types for workbook and worksheet conversion.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, XlsxCsvError>;

/// Errors raised while reading a workbook or converting a worksheet.
#[derive(Error, Debug)]
pub enum XlsxCsvError {
    /// An A1 cell or range reference could not be decoded.
    #[error("Malformed reference: {0}")]
    MalformedReference(String),

    /// One or more requested sheet names do not exist in the workbook.
    #[error("The following specified sheets were not found: {}", .missing.join(", "))]
    UnknownSheet { missing: Vec<String> },

    /// The rename list does not line up with the selected sheets.
    #[error(
        "Rename count ({renames}) must equal the number of selected sheets ({names})"
    )]
    RenameCountMismatch { names: usize, renames: usize },

    /// A worksheet has no `<dimension>` range ahead of its rows.
    #[error("Worksheet '{sheet}' does not declare a dimension range")]
    MissingDimension { sheet: String },

    /// A row element carries no usable row number.
    #[error("Worksheet '{sheet}': invalid row: {detail}")]
    InvalidRow { sheet: String, detail: String },

    /// Rows or cells appear out of ascending order.
    #[error("Worksheet '{sheet}': out of order: {detail}")]
    OutOfOrder { sheet: String, detail: String },

    /// A cell needs a package part the workbook does not have.
    #[error("Worksheet '{sheet}' cell {cell} references the {part} part, which the workbook does not contain")]
    MissingPart {
        sheet: String,
        cell: String,
        part: String,
    },

    /// The package layout is not a usable spreadsheet.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// The XML tokenizer rejected a part.
    #[error("XML parsing error in {part}: {message}")]
    Xml { part: String, message: String },

    /// A failure scoped to a single worksheet.
    #[error("Sheet '{sheet}': {source}")]
    Sheet {
        sheet: String,
        #[source]
        source: Box<XlsxCsvError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl XlsxCsvError {
    pub(crate) fn xml(part: &str, err: impl std::fmt::Display) -> Self {
        XlsxCsvError::Xml {
            part: part.to_string(),
            message: err.to_string(),
        }
    }

    /// Attach the owning sheet name to an error, unless it already names one.
    pub(crate) fn in_sheet(self, sheet: &str) -> Self {
        match self {
            XlsxCsvError::Sheet { .. }
            | XlsxCsvError::MissingDimension { .. }
            | XlsxCsvError::InvalidRow { .. }
            | XlsxCsvError::OutOfOrder { .. }
            | XlsxCsvError::MissingPart { .. } => self,
            other => XlsxCsvError::Sheet {
                sheet: sheet.to_string(),
                source: Box::new(other),
            },
        }
    }
}
