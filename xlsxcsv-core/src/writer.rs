//! CSV escaping and line output.

use std::borrow::Cow;
use std::io::{self, Write};

/// Wrap `value` in double quotes when it contains a comma, a double quote, a
/// carriage return or a line feed, doubling any inner quotes. Anything else,
/// numbers and dates included, is written as is.
pub fn escape_csv(value: &str) -> Cow<'_, str> {
    if !value.contains([',', '"', '\r', '\n']) {
        return Cow::Borrowed(value);
    }

    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('"');
    for c in value.chars() {
        if c == '"' {
            escaped.push('"');
        }
        escaped.push(c);
    }
    escaped.push('"');
    Cow::Owned(escaped)
}

/// Writes finished rows as `\n`-terminated lines.
pub struct CsvWriter<W: Write> {
    inner: W,
    index: itoa::Buffer,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(inner: W) -> Self {
        CsvWriter {
            inner,
            index: itoa::Buffer::new(),
        }
    }

    /// Write one line. `cells` is the already joined and escaped row; an index,
    /// when given, is written quoted in front of it.
    pub fn write_row(&mut self, index: Option<u32>, cells: &str) -> io::Result<()> {
        if let Some(index) = index {
            self.inner.write_all(b"\"")?;
            self.inner.write_all(self.index.format(index).as_bytes())?;
            self.inner.write_all(b"\",")?;
        }
        self.inner.write_all(cells.as_bytes())?;
        self.inner.write_all(b"\n")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
