//! Rendering of raw cell values into display text.

use std::borrow::Cow;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::error::Result;
use crate::number_format::{FormatKind, NumberFormatTable};
use crate::shared_strings::SharedStringTable;

/// Error literals Excel stores as cell values. `#DIV/O!` (letter O) is kept
/// alongside `#DIV/0!` for producers that write it that way.
pub const EXCEL_ERRORS: [&str; 8] = [
    "#N/A", "#REF!", "#VALUE!", "#NAME?", "#DIV/O!", "#DIV/0!", "#NULL!", "#NUM!",
];

const MILLIS_PER_DAY: i64 = 86_400_000;
/// Open bounds of the OLE automation date range, in days.
const OLE_DATE_MIN: f64 = -657_435.0;
const OLE_DATE_MAX: f64 = 2_958_466.0;
/// Largest exponent a decimal literal may carry and still be rewritten.
const MAX_DECIMAL_EXPONENT: i64 = 28;

const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Declared type of a cell (its `t` attribute).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CellType {
    /// `t="s"`: the value is an index into the shared-string table.
    SharedString,
    /// No `t` attribute, or `t="n"`.
    #[default]
    Number,
    /// `t="b"`.
    Boolean,
    /// `t="inlineStr"`: text carried in the cell's own `<is>` element.
    InlineString,
    /// Formula strings, errors, ISO dates and anything else.
    Other,
}

impl CellType {
    /// Decode a `t` attribute value.
    pub fn from_attr(value: Option<&[u8]>) -> Self {
        match value {
            None | Some(b"n") | Some(b"") => CellType::Number,
            Some(b"s") => CellType::SharedString,
            Some(b"b") => CellType::Boolean,
            Some(b"inlineStr") => CellType::InlineString,
            Some(_) => CellType::Other,
        }
    }
}

/// Whether `value` is one of the fixed Excel error literals.
pub fn is_excel_error(value: &str) -> bool {
    EXCEL_ERRORS.contains(&value)
}

/// Turns raw cell values into their final text, using the workbook's shared
/// strings and number formats. CSV escaping is left to the caller.
#[derive(Clone, Copy, Debug)]
pub struct ValueFormatter<'a> {
    shared_strings: &'a SharedStringTable,
    number_formats: &'a NumberFormatTable,
    treat_errors_as_empty: bool,
}

impl<'a> ValueFormatter<'a> {
    pub fn new(
        shared_strings: &'a SharedStringTable,
        number_formats: &'a NumberFormatTable,
        treat_errors_as_empty: bool,
    ) -> Self {
        ValueFormatter {
            shared_strings,
            number_formats,
            treat_errors_as_empty,
        }
    }

    /// Render one raw value.
    ///
    /// Shared-string cells resolve through the table and are never number
    /// formatted; an index past the end yields an empty cell. Other cells are
    /// rendered by the kind of their resolved number format. Fails only when a
    /// shared-string cell meets a workbook without a shared-strings part.
    pub fn format<'r>(
        &'r self,
        raw: &'r str,
        cell_type: CellType,
        style_id: Option<u32>,
    ) -> Result<Cow<'r, str>> {
        if raw.is_empty() {
            return Ok(Cow::Borrowed(""));
        }
        if self.treat_errors_as_empty && is_excel_error(raw) {
            return Ok(Cow::Borrowed(""));
        }

        match cell_type {
            CellType::SharedString => {
                let text = match raw.trim().parse::<usize>() {
                    Ok(index) => self.shared_strings.get(index)?.unwrap_or(""),
                    Err(_) => "",
                };
                Ok(Cow::Borrowed(text))
            }
            CellType::InlineString => Ok(Cow::Borrowed(raw)),
            CellType::Number | CellType::Boolean | CellType::Other => {
                Ok(format_with_kind(raw, self.number_formats.kind_for_style(style_id)))
            }
        }
    }
}

/// Apply a resolved format kind to a raw value. Values that do not parse as
/// numbers come back unchanged.
pub fn format_with_kind(raw: &str, kind: FormatKind) -> Cow<'_, str> {
    let formatted = match kind {
        FormatKind::General => None,
        FormatKind::Exponential => exponential_to_plain(raw),
        FormatKind::DateTime => format_date_time(raw),
    };
    formatted.map_or(Cow::Borrowed(raw), Cow::Owned)
}

/// Render a serial day offset as `YYYY-MM-DDTHH:mm:ss`.
pub fn format_date_time(raw: &str) -> Option<String> {
    let value: f64 = raw.trim().parse().ok()?;
    let datetime = ole_to_datetime(value)?;
    Some(datetime.format(DATE_TIME_FORMAT).to_string())
}

/// Convert an OLE automation date (days since 1899-12-30) to a timestamp.
///
/// Rounds to the nearest millisecond. For negative values the fractional part
/// is a time of day counted forward from midnight of the whole day.
pub fn ole_to_datetime(value: f64) -> Option<NaiveDateTime> {
    if !(value > OLE_DATE_MIN && value < OLE_DATE_MAX) {
        return None;
    }

    let half = if value >= 0.0 { 0.5 } else { -0.5 };
    let mut millis = (value * MILLIS_PER_DAY as f64 + half) as i64;
    if millis < 0 {
        millis -= (millis % MILLIS_PER_DAY) * 2;
    }

    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    epoch.checked_add_signed(TimeDelta::try_milliseconds(millis)?)
}

/// Rewrite a decimal literal in plain notation, dropping any exponent.
///
/// The literal's own digits are shifted, so no precision is lost and trailing
/// fractional zeros stay as written (`1.500E-2` -> `0.01500`).
pub fn exponential_to_plain(raw: &str) -> Option<String> {
    let text = raw.trim();
    let (negative, body) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };

    let (mantissa, exponent) = match body.find(|c: char| c == 'e' || c == 'E') {
        Some(pos) => (&body[..pos], parse_exponent(&body[pos + 1..])?),
        None => (body, 0),
    };
    if exponent.abs() > MAX_DECIMAL_EXPONENT {
        return None;
    }

    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (mantissa, ""),
    };
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if int_part.is_empty() && frac_part.is_empty()
        || !all_digits(int_part)
        || !all_digits(frac_part)
    {
        return None;
    }

    let digits: String = format!("{}{}", int_part, frac_part);
    let point = int_part.len() as i64 + exponent;

    let (whole, fraction) = if point <= 0 {
        let zeros = "0".repeat((-point) as usize);
        (String::new(), format!("{}{}", zeros, digits))
    } else if point as usize >= digits.len() {
        let zeros = "0".repeat(point as usize - digits.len());
        (format!("{}{}", digits, zeros), String::new())
    } else {
        let (w, f) = digits.split_at(point as usize);
        (w.to_string(), f.to_string())
    };

    let whole = whole.trim_start_matches('0');
    let whole = if whole.is_empty() { "0" } else { whole };

    let is_zero = digits.bytes().all(|b| b == b'0');
    let mut result = String::with_capacity(whole.len() + fraction.len() + 2);
    if negative && !is_zero {
        result.push('-');
    }
    result.push_str(whole);
    if !fraction.is_empty() {
        result.push('.');
        result.push_str(&fraction);
    }
    Some(result)
}

fn parse_exponent(text: &str) -> Option<i64> {
    let (negative, digits) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // saturate so absurd exponents fall past the decimal range check
    let value = digits.parse::<i64>().unwrap_or(i64::MAX / 2);
    Some(if negative { -value } else { value })
}
