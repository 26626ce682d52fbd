//! Number-format lookup: built-in format ids and custom `numFmt` codes.

#[cfg(feature = "fast-hash")]
use hashbrown::HashMap;
#[cfg(not(feature = "fast-hash"))]
use std::collections::HashMap;
use std::io::BufRead;

use log::debug;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Result, XlsxCsvError};
use crate::utils::parse_u32_bytes;
use crate::xml;

const PART: &str = "styles.xml";

/// Highest format id reserved for built-in formats. Custom formats start above it.
pub const BUILTIN_FORMAT_MAX: u32 = 163;

/// Built-in ids rendered in scientific notation.
const EXPONENTIAL_IDS: [u32; 2] = [11, 48];

/// Characters that make a custom code a date or time format.
const DATE_TIME_CHARS: [char; 5] = ['d', 'm', 'y', 'h', 's'];

/// How a raw cell value is rendered for a given number format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatKind {
    /// Value passes through unchanged.
    General,
    /// Scientific notation, rewritten to plain decimal.
    Exponential,
    /// Serial day offset, rendered as an ISO-like timestamp.
    DateTime,
}

/// Classify a built-in format id.
pub fn builtin_kind(id: u32) -> FormatKind {
    match id {
        id if EXPONENTIAL_IDS.contains(&id) => FormatKind::Exponential,
        14..=22 | 27..=36 | 45..=47 | 50..=58 | 81 => FormatKind::DateTime,
        _ => FormatKind::General,
    }
}

/// Classify a custom format code by the characters it contains.
///
/// An `E` anywhere marks scientific notation; otherwise any of `d m y h s`
/// marks a date or time. Literal text and colour sections count too, so
/// `0 "days"` and `[Red]0.00` are date codes.
pub fn code_kind(code: &str) -> FormatKind {
    if code.contains('E') {
        FormatKind::Exponential
    } else if code.contains(DATE_TIME_CHARS) {
        FormatKind::DateTime
    } else {
        FormatKind::General
    }
}

/// Custom number formats and the cell-style to format-id mapping of a workbook.
#[derive(Clone, Debug, Default)]
pub struct NumberFormatTable {
    codes: HashMap<u32, String>,
    kinds: HashMap<u32, FormatKind>,
    /// `cellXfs` entries in order: style index -> numFmtId.
    cell_formats: Vec<u32>,
}

impl NumberFormatTable {
    /// Empty table: every style falls back to the built-in classification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom format code.
    pub fn insert(&mut self, id: u32, code: impl Into<String>) {
        let code = code.into();
        self.kinds.insert(id, code_kind(&code));
        self.codes.insert(id, code);
    }

    /// Register the next `cellXfs` entry.
    pub fn push_cell_format(&mut self, num_fmt_id: u32) {
        self.cell_formats.push(num_fmt_id);
    }

    /// Stream the styles part once, keeping only `numFmts/numFmt` pairs and the
    /// `numFmtId` of each `cellXfs/xf`. Every other section is read through and
    /// dropped.
    pub fn load<R: BufRead>(source: R) -> Result<Self> {
        let mut reader = xml::reader(source);
        let mut buf = Vec::new();
        let mut table = NumberFormatTable::new();

        let mut in_num_fmts = false;
        let mut in_cell_xfs = false;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"numFmts" => in_num_fmts = true,
                    b"cellXfs" => in_cell_xfs = true,
                    b"numFmt" if in_num_fmts => table.read_num_fmt(&e),
                    b"xf" if in_cell_xfs => table.read_xf(&e),
                    _ => {}
                },
                Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"numFmt" if in_num_fmts => table.read_num_fmt(&e),
                    b"xf" if in_cell_xfs => table.read_xf(&e),
                    _ => {}
                },
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"numFmts" => in_num_fmts = false,
                    b"cellXfs" => in_cell_xfs = false,
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxCsvError::xml(PART, e)),
                _ => {}
            }
            buf.clear();
        }

        debug!(
            "Loaded {} custom number formats, {} cell formats",
            table.codes.len(),
            table.cell_formats.len()
        );
        Ok(table)
    }

    fn read_num_fmt(&mut self, e: &BytesStart<'_>) {
        let id = xml::attr_raw(e, b"numFmtId").and_then(|v| parse_u32_bytes(&v));
        if let Some(id) = id {
            let code = xml::attr_string(e, b"formatCode").unwrap_or_default();
            self.insert(id, code);
        }
    }

    fn read_xf(&mut self, e: &BytesStart<'_>) {
        let id = xml::attr_raw(e, b"numFmtId")
            .and_then(|v| parse_u32_bytes(&v))
            .unwrap_or(0);
        self.push_cell_format(id);
    }

    /// The custom format code registered for `id`, if any.
    pub fn format_code(&self, id: u32) -> Option<&str> {
        self.codes.get(&id).map(String::as_str)
    }

    /// Number of custom format codes.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Map a cell's style index to a number-format id.
    ///
    /// With a `cellXfs` list the index selects an entry; without one the style
    /// id is taken to be the format id itself.
    pub fn format_id_for_style(&self, style_id: u32) -> Option<u32> {
        if self.cell_formats.is_empty() {
            Some(style_id)
        } else {
            self.cell_formats.get(style_id as usize).copied()
        }
    }

    /// Resolve a format id: custom code first, then the built-in table for
    /// ids up to [`BUILTIN_FORMAT_MAX`], otherwise general.
    pub fn kind_for_format(&self, format_id: u32) -> FormatKind {
        if let Some(kind) = self.kinds.get(&format_id) {
            *kind
        } else if format_id <= BUILTIN_FORMAT_MAX {
            builtin_kind(format_id)
        } else {
            FormatKind::General
        }
    }

    /// Resolve the rendering for a cell's optional style index.
    pub fn kind_for_style(&self, style_id: Option<u32>) -> FormatKind {
        style_id
            .and_then(|id| self.format_id_for_style(id))
            .map_or(FormatKind::General, |id| self.kind_for_format(id))
    }
}
