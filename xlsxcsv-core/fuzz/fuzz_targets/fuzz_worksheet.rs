#![no_main]

//! Fuzz target for the worksheet converter.
//!
//! Arbitrary bytes are fed as worksheet XML, both raw and wrapped in a valid
//! dimension and `<sheetData>` so the row and cell paths get exercised. The
//! converter may reject input with an error but must never panic, and every
//! line it writes must end in `\n`.

use libfuzzer_sys::fuzz_target;
use xlsxcsv_core::{ConvertOptions, NumberFormatTable, SharedStringTable, WorksheetConverter};

fn convert(xml: &[u8], options: ConvertOptions) {
    let strings = SharedStringTable::from_strings(["a", "b,c", "\"q\""]);
    let mut formats = NumberFormatTable::new();
    formats.insert(164, "yyyy-mm-dd");
    formats.push_cell_format(0);
    formats.push_cell_format(14);
    formats.push_cell_format(11);
    formats.push_cell_format(164);

    let converter = WorksheetConverter::new("Fuzz", &strings, &formats, options);
    let mut out = Vec::new();
    if let Ok(stats) = converter.convert(xml, &mut out) {
        assert!(stats.rows_written <= stats.rows_covered);
        assert!(out.is_empty() || out.ends_with(b"\n"));
        let lines = out.iter().filter(|&&b| b == b'\n').count();
        assert!(lines >= stats.rows_written as usize);
    }
}

fuzz_target!(|data: &[u8]| {
    let flags = data.first().copied().unwrap_or(0);
    let options = ConvertOptions::new()
        .with_indexed(flags & 1 != 0)
        .with_treat_errors_as_empty(flags & 2 != 0)
        .with_remove_empty_rows(flags & 4 != 0);

    convert(data, options);

    let mut wrapped = b"<worksheet><dimension ref=\"A1:D20\"/><sheetData>".to_vec();
    wrapped.extend_from_slice(data);
    wrapped.extend_from_slice(b"</sheetData></worksheet>");
    convert(&wrapped, options);
});
