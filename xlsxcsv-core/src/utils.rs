//! A1 reference decoding, number parsing and file-name helpers.

use std::fmt;

use crate::error::{Result, XlsxCsvError};

/// Maximum column number in Excel (XFD = 16384).
pub const MAX_COLUMN: u32 = 16384;
/// Maximum row number in Excel.
pub const MAX_ROW: u32 = 1_048_576;

/// Characters that may not appear in an output file name.
const INVALID_FILE_NAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// A decoded A1 reference. Column and row are both 1-indexed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellAddress {
    pub column: u32,
    pub row: u32,
}

impl CellAddress {
    pub fn new(column: u32, row: u32) -> Self {
        CellAddress { column, row }
    }

    /// Parse an A1 reference such as `"C7"` or `"aa10"`.
    ///
    /// Letters and digits are collected independently of their position, so
    /// `"$B$4"` decodes like `"B4"`.
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_bytes(text.as_bytes()).ok_or_else(|| {
            XlsxCsvError::MalformedReference(format!("Invalid cell reference: '{}'", text))
        })
    }

    /// Byte-level variant of [`CellAddress::parse`] used on the worksheet hot path.
    #[inline]
    pub fn parse_bytes(bytes: &[u8]) -> Option<Self> {
        let column = decode_column(bytes)?;
        if !bytes.iter().any(u8::is_ascii_digit) {
            return None;
        }
        let row = decode_row(bytes)?;
        if row == 0 || row > MAX_ROW {
            return None;
        }
        Some(CellAddress { column, row })
    }

    /// Encode back into A1 form.
    pub fn to_a1(&self) -> String {
        coordinate_from_row_col(self.row, self.column)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_to_letter(self.column), self.row)
    }
}

/// A decoded `"A1:Z99"` range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeAddress {
    pub start: CellAddress,
    pub end: CellAddress,
}

impl RangeAddress {
    /// Parse a range reference. Exactly one `:` is required.
    pub fn parse(text: &str) -> Result<Self> {
        let mut parts = text.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(start), Some(end), None) => Ok(RangeAddress {
                start: CellAddress::parse(start)?,
                end: CellAddress::parse(end)?,
            }),
            _ => Err(XlsxCsvError::MalformedReference(format!(
                "Range reference must contain exactly one ':': '{}'",
                text
            ))),
        }
    }

    /// Parse a worksheet `<dimension ref>`, which Excel writes as a lone cell
    /// (`"A1"`) for empty and single-cell sheets.
    pub fn parse_dimension(text: &str) -> Result<Self> {
        if text.contains(':') {
            return Self::parse(text);
        }
        let cell = CellAddress::parse(text)?;
        Ok(RangeAddress { start: cell, end: cell })
    }
}

impl fmt::Display for RangeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Decode the column part of a reference: every ASCII letter, most significant
/// first, in bijective base 26 (A=1 .. Z=26, AA=27). Other bytes are skipped.
///
/// Returns `None` when there are no letters or the column exceeds [`MAX_COLUMN`].
#[inline]
pub fn decode_column(bytes: &[u8]) -> Option<u32> {
    let mut column: u32 = 0;
    for &b in bytes {
        let upper = match b {
            b'a'..=b'z' => b - 32,
            b'A'..=b'Z' => b,
            _ => continue,
        };
        column = column.checked_mul(26)?.checked_add((upper - b'A' + 1) as u32)?;
        if column > MAX_COLUMN {
            return None;
        }
    }
    if column == 0 {
        None
    } else {
        Some(column)
    }
}

/// Decode the row part of a reference from its ASCII digits. No digits yields
/// row 0, which callers treat as unset. `None` only on overflow.
#[inline]
pub fn decode_row(bytes: &[u8]) -> Option<u32> {
    let mut row: u32 = 0;
    for &b in bytes.iter().filter(|b| b.is_ascii_digit()) {
        row = row.checked_mul(10)?.checked_add((b - b'0') as u32)?;
    }
    Some(row)
}

/// Parse a u32 directly from bytes without string allocation.
#[inline]
pub fn parse_u32_bytes(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() {
        return None;
    }
    let mut result: u32 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        result = result.checked_mul(10)?.checked_add((b - b'0') as u32)?;
    }
    Some(result)
}

/// Convert column number (1-indexed) to letters (e.g., 1 -> "A", 28 -> "AB").
pub fn column_to_letter(column: u32) -> String {
    let mut result = String::new();
    let mut col = column;

    while col > 0 {
        col -= 1;
        let letter = (b'A' + (col % 26) as u8) as char;
        result.insert(0, letter);
        col /= 26;
    }

    result
}

/// Create a cell coordinate string from row and column (1-indexed).
pub fn coordinate_from_row_col(row: u32, column: u32) -> String {
    format!("{}{}", column_to_letter(column), row)
}

/// Replace every character that cannot appear in a file name with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_control() || INVALID_FILE_NAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}
