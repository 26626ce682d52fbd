//! Streaming conversion of a single worksheet part into CSV.
//!
//! Worksheet XML stores rows and cells sparsely: anything blank is simply left
//! out. The converter rebuilds the dense grid in one forward pass, holding no
//! more than the row currently being read.

use std::io::{BufRead, BufWriter, Write};
use std::time::{Duration, Instant};

use quick_xml::events::{BytesStart, Event};

use crate::error::{Result, XlsxCsvError};
use crate::format::{CellType, ValueFormatter};
use crate::number_format::NumberFormatTable;
use crate::shared_strings::SharedStringTable;
use crate::utils::{column_to_letter, parse_u32_bytes, CellAddress, RangeAddress};
use crate::writer::{escape_csv, CsvWriter};
use crate::xml;

const PART: &str = "worksheet";
const OUTPUT_BUFFER: usize = 128 * 1024;

/// Per-conversion switches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Prepend a quoted, contiguous 1-based row index column.
    pub indexed: bool,
    /// Write Excel error literals (`#N/A`, `#REF!`, ...) as empty cells.
    pub treat_errors_as_empty: bool,
    /// Drop rows whose every cell is empty, and skip gap rows entirely.
    pub remove_empty_rows: bool,
}

impl ConvertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_indexed(mut self, indexed: bool) -> Self {
        self.indexed = indexed;
        self
    }

    pub fn with_treat_errors_as_empty(mut self, treat_errors_as_empty: bool) -> Self {
        self.treat_errors_as_empty = treat_errors_as_empty;
        self
    }

    pub fn with_remove_empty_rows(mut self, remove_empty_rows: bool) -> Self {
        self.remove_empty_rows = remove_empty_rows;
        self
    }
}

/// Running counters of a worksheet conversion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SheetStats {
    /// Rows consumed from the source, synthesized blank rows included.
    pub rows_covered: u32,
    /// Rows actually written after empty-row removal.
    pub rows_written: u32,
    /// Last row of the declared dimension.
    pub rows_declared: u32,
    pub elapsed: Duration,
}

impl SheetStats {
    /// Progress through the declared rows, in percent. Capped at 100 since a
    /// stale dimension can understate the real row count.
    pub fn percent(&self) -> f64 {
        if self.rows_declared == 0 {
            return 100.0;
        }
        (f64::from(self.rows_covered) * 100.0 / f64::from(self.rows_declared)).min(100.0)
    }
}

/// Converts one worksheet's XML into CSV lines.
///
/// The shared strings and number formats are read-only workbook state, so a
/// converter per sheet can run on any thread.
///
/// # Example
/// ```
/// use xlsxcsv_core::{ConvertOptions, NumberFormatTable, SharedStringTable, WorksheetConverter};
///
/// let strings = SharedStringTable::from_strings(["Name"]);
/// let formats = NumberFormatTable::new();
/// let converter = WorksheetConverter::new("Sheet1", &strings, &formats, ConvertOptions::default());
///
/// let xml = r#"<worksheet><dimension ref="A1:B2"/><sheetData>
///     <row r="1"><c r="A1" t="s"><v>0</v></c></row>
///     <row r="2"><c r="B2"><v>42</v></c></row>
/// </sheetData></worksheet>"#;
///
/// let mut csv = Vec::new();
/// let stats = converter.convert(xml.as_bytes(), &mut csv).unwrap();
/// assert_eq!(String::from_utf8(csv).unwrap(), "Name,\n,42\n");
/// assert_eq!(stats.rows_written, 2);
/// ```
pub struct WorksheetConverter<'a> {
    sheet_name: &'a str,
    formatter: ValueFormatter<'a>,
    options: ConvertOptions,
    progress: Option<&'a dyn Fn(&SheetStats)>,
}

/// The cell being read.
#[derive(Default)]
struct PendingCell {
    column: u32,
    cell_type: CellType,
    style: Option<u32>,
    value: String,
}

/// Escaped values of the current row, already joined with commas.
#[derive(Default)]
struct RowBuffer {
    line: String,
    cells: u32,
    has_content: bool,
}

impl RowBuffer {
    fn clear(&mut self) {
        self.line.clear();
        self.cells = 0;
        self.has_content = false;
    }

    fn push(&mut self, value: &str) {
        if self.cells > 0 {
            self.line.push(',');
        }
        self.line.push_str(value);
        self.cells += 1;
        self.has_content |= !value.is_empty();
    }

    fn pad_to(&mut self, columns: u32) {
        while self.cells < columns {
            self.push("");
        }
    }
}

/// Everything that changes while one worksheet is read.
#[derive(Default)]
struct ConversionState {
    /// Set by the dimension element; rows cannot be placed without it.
    column_count: Option<u32>,
    blank_line: String,
    stats: SheetStats,
    row: u32,
    last_column: u32,
    buffer: RowBuffer,
    cell: PendingCell,
}

impl<'a> WorksheetConverter<'a> {
    pub fn new(
        sheet_name: &'a str,
        shared_strings: &'a SharedStringTable,
        number_formats: &'a NumberFormatTable,
        options: ConvertOptions,
    ) -> Self {
        WorksheetConverter {
            sheet_name,
            formatter: ValueFormatter::new(
                shared_strings,
                number_formats,
                options.treat_errors_as_empty,
            ),
            options,
            progress: None,
        }
    }

    /// Receive the running counters after every row that is written or elided.
    pub fn with_progress(mut self, progress: &'a dyn Fn(&SheetStats)) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Stream `source` (worksheet XML) into `sink` as CSV.
    ///
    /// Output is written row by row; on failure whatever was already flushed
    /// stays in the sink. Every error names this worksheet.
    pub fn convert<R: BufRead, W: Write>(&self, source: R, sink: W) -> Result<SheetStats> {
        let started = Instant::now();
        let mut out = CsvWriter::new(BufWriter::with_capacity(OUTPUT_BUFFER, sink));

        let mut stats = self
            .stream_rows(source, &mut out)
            .map_err(|e| self.scoped(e))?;
        out.flush().map_err(|e| self.scoped(e.into()))?;

        stats.elapsed = started.elapsed();
        Ok(stats)
    }

    fn stream_rows<R: BufRead, W: Write>(
        &self,
        source: R,
        out: &mut CsvWriter<W>,
    ) -> Result<SheetStats> {
        let mut reader = xml::reader(source);
        let mut buf = Vec::new();
        let mut state = ConversionState::default();

        let mut in_sheet_data = false;
        let mut in_row = false;
        let mut in_cell = false;
        let mut in_value = false;
        let mut in_inline = false;
        let mut in_inline_text = false;
        let mut phonetic_depth = 0usize;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"dimension" if !in_sheet_data => self.read_dimension(&e, &mut state)?,
                    b"sheetData" => {
                        self.column_count(&state)?;
                        in_sheet_data = true;
                    }
                    b"row" if in_sheet_data => {
                        self.begin_row(&e, &mut state, out)?;
                        in_row = true;
                    }
                    b"c" if in_row => {
                        self.begin_cell(&e, &mut state)?;
                        in_cell = true;
                    }
                    b"v" if in_cell => {
                        state.cell.value.clear();
                        in_value = true;
                    }
                    b"is" if in_cell => {
                        state.cell.value.clear();
                        in_inline = true;
                    }
                    b"rPh" if in_inline => phonetic_depth += 1,
                    b"t" if in_inline && phonetic_depth == 0 => in_inline_text = true,
                    _ => {}
                },
                Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"dimension" if !in_sheet_data => self.read_dimension(&e, &mut state)?,
                    b"sheetData" => {
                        self.column_count(&state)?;
                        break;
                    }
                    b"row" if in_sheet_data => {
                        self.begin_row(&e, &mut state, out)?;
                        self.finish_row(&mut state, out)?;
                    }
                    b"c" if in_row => {
                        self.begin_cell(&e, &mut state)?;
                        self.finish_cell(&mut state)?;
                    }
                    _ => {}
                },
                Ok(Event::Text(e)) => {
                    if in_value || in_inline_text {
                        state.cell.value.push_str(&xml::text(&e, PART)?);
                    }
                }
                Ok(Event::CData(e)) => {
                    if in_value || in_inline_text {
                        state.cell.value.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"v" => in_value = false,
                    b"t" => in_inline_text = false,
                    b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                    b"is" => in_inline = false,
                    b"c" if in_cell => {
                        self.finish_cell(&mut state)?;
                        in_cell = false;
                    }
                    b"row" if in_row => {
                        self.finish_row(&mut state, out)?;
                        in_row = false;
                    }
                    b"sheetData" => break,
                    _ => {}
                },
                Ok(Event::Eof) => {
                    self.column_count(&state)?;
                    break;
                }
                Err(e) => return Err(XlsxCsvError::xml(PART, e)),
                _ => {}
            }
            buf.clear();
        }

        Ok(state.stats)
    }

    fn read_dimension(&self, e: &BytesStart<'_>, state: &mut ConversionState) -> Result<()> {
        let reference = xml::attr_string(e, b"ref").ok_or_else(|| self.missing_dimension())?;
        let range = RangeAddress::parse_dimension(&reference)?;

        let columns = range.end.column;
        state.column_count = Some(columns);
        state.blank_line = ",".repeat(columns.saturating_sub(1) as usize);
        state.stats.rows_declared = range.end.row;
        Ok(())
    }

    fn column_count(&self, state: &ConversionState) -> Result<u32> {
        state.column_count.ok_or_else(|| self.missing_dimension())
    }

    fn begin_row<W: Write>(
        &self,
        e: &BytesStart<'_>,
        state: &mut ConversionState,
        out: &mut CsvWriter<W>,
    ) -> Result<()> {
        let row = match xml::attr_raw(e, b"r") {
            Some(raw) => match parse_u32_bytes(&raw) {
                Some(row) if row > 0 => row,
                _ => {
                    return Err(XlsxCsvError::InvalidRow {
                        sheet: self.sheet_name.to_string(),
                        detail: format!("row number '{}'", String::from_utf8_lossy(&raw)),
                    })
                }
            },
            None => {
                return Err(XlsxCsvError::InvalidRow {
                    sheet: self.sheet_name.to_string(),
                    detail: format!("row after row {} has no row number", state.stats.rows_covered),
                })
            }
        };

        if row <= state.stats.rows_covered {
            return Err(XlsxCsvError::OutOfOrder {
                sheet: self.sheet_name.to_string(),
                detail: format!("row {} follows row {}", row, state.stats.rows_covered),
            });
        }

        if !self.options.remove_empty_rows {
            for gap in state.stats.rows_covered + 1..row {
                out.write_row(self.index_for(gap, &state.stats), &state.blank_line)?;
                state.stats.rows_written += 1;
                state.stats.rows_covered = gap;
                self.report(&state.stats);
            }
        }

        state.row = row;
        state.last_column = 0;
        state.buffer.clear();
        Ok(())
    }

    fn begin_cell(&self, e: &BytesStart<'_>, state: &mut ConversionState) -> Result<()> {
        let column = match xml::attr_raw(e, b"r") {
            Some(raw) => match CellAddress::parse_bytes(&raw) {
                Some(address) => address.column,
                None => {
                    return Err(XlsxCsvError::MalformedReference(format!(
                        "row {}: cell reference '{}'",
                        state.row,
                        String::from_utf8_lossy(&raw)
                    )))
                }
            },
            None => state.last_column + 1,
        };

        if column <= state.last_column {
            return Err(XlsxCsvError::OutOfOrder {
                sheet: self.sheet_name.to_string(),
                detail: format!(
                    "cell {}{} follows column {}",
                    column_to_letter(column),
                    state.row,
                    column_to_letter(state.last_column)
                ),
            });
        }

        let cell = &mut state.cell;
        cell.column = column;
        cell.cell_type = CellType::from_attr(xml::attr_raw(e, b"t").as_deref());
        cell.style = xml::attr_raw(e, b"s").and_then(|v| parse_u32_bytes(&v));
        cell.value.clear();
        state.last_column = column;
        Ok(())
    }

    fn finish_cell(&self, state: &mut ConversionState) -> Result<()> {
        let cell = &state.cell;
        let text = self
            .formatter
            .format(&cell.value, cell.cell_type, cell.style)
            .map_err(|e| match e {
                XlsxCsvError::MissingPart { part, .. } => XlsxCsvError::MissingPart {
                    sheet: self.sheet_name.to_string(),
                    cell: CellAddress::new(cell.column, state.row).to_a1(),
                    part,
                },
                other => other,
            })?;

        state.buffer.pad_to(cell.column - 1);
        state.buffer.push(&escape_csv(&text));
        Ok(())
    }

    fn finish_row<W: Write>(&self, state: &mut ConversionState, out: &mut CsvWriter<W>) -> Result<()> {
        let columns = self.column_count(state)?;
        state.buffer.pad_to(columns);
        state.stats.rows_covered = state.row;

        if state.buffer.has_content || !self.options.remove_empty_rows {
            out.write_row(self.index_for(state.row, &state.stats), &state.buffer.line)?;
            state.stats.rows_written += 1;
        }

        self.report(&state.stats);
        Ok(())
    }

    /// Output index of a row: its own number, but never more than one past the
    /// last written row, so elided rows leave no holes.
    fn index_for(&self, row: u32, stats: &SheetStats) -> Option<u32> {
        self.options
            .indexed
            .then(|| row.min(stats.rows_written + 1))
    }

    fn report(&self, stats: &SheetStats) {
        if let Some(progress) = self.progress {
            progress(stats);
        }
    }

    fn missing_dimension(&self) -> XlsxCsvError {
        XlsxCsvError::MissingDimension {
            sheet: self.sheet_name.to_string(),
        }
    }

    fn scoped(&self, err: XlsxCsvError) -> XlsxCsvError {
        err.in_sheet(self.sheet_name)
    }
}
