#![no_main]

//! Fuzz target for A1 reference decoding in xlsxcsv-core.
//!
//! Decoding must never panic, and whatever it accepts must be a valid
//! 1-indexed address inside the sheet limits.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use xlsxcsv_core::{
    column_to_letter, decode_column, decode_row, CellAddress, RangeAddress, MAX_COLUMN, MAX_ROW,
};

#[derive(Arbitrary, Debug)]
struct CoordinateFuzzInput {
    raw_bytes: Vec<u8>,
    string_input: String,
    row: u32,
    column: u32,
}

fn fuzz_parse_bytes(input: &[u8]) {
    if let Some(address) = CellAddress::parse_bytes(input) {
        assert!(address.column >= 1 && address.column <= MAX_COLUMN);
        assert!(address.row >= 1 && address.row <= MAX_ROW);
    }
    if let Some(column) = decode_column(input) {
        assert!(column >= 1 && column <= MAX_COLUMN);
    }
    let _ = decode_row(input);
}

/// String and byte parsers must agree.
fn fuzz_consistency(input: &str) {
    match (CellAddress::parse(input), CellAddress::parse_bytes(input.as_bytes())) {
        (Ok(s), Some(b)) => assert_eq!(s, b, "parsers disagree for {:?}", input),
        (Err(_), None) => {}
        (s, b) => panic!("parsers disagree for {:?}: {:?} vs {:?}", input, s.ok(), b),
    }
}

fn fuzz_roundtrip(row: u32, column: u32) {
    let column = column % MAX_COLUMN + 1;
    let row = row % MAX_ROW + 1;
    let address = CellAddress::new(column, row);
    assert_eq!(CellAddress::parse(&address.to_a1()).ok(), Some(address));
    assert_eq!(decode_column(column_to_letter(column).as_bytes()), Some(column));
}

fn fuzz_range(input: &str) {
    if let Ok(range) = RangeAddress::parse(input) {
        assert!(range.start.row > 0 && range.end.column > 0);
        assert_eq!(input.matches(':').count(), 1);
    }
    if let Ok(range) = RangeAddress::parse_dimension(input) {
        assert!(range.end.row > 0 && range.end.column > 0);
    }
}

fuzz_target!(|input: CoordinateFuzzInput| {
    fuzz_parse_bytes(&input.raw_bytes);
    fuzz_consistency(&input.string_input);
    fuzz_roundtrip(input.row, input.column);
    fuzz_range(&input.string_input);
});
