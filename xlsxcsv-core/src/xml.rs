//! Small helpers over the quick-xml pull reader shared by every part parser.

use std::borrow::Cow;
use std::io::BufRead;

use quick_xml::events::{BytesStart, BytesText};
use quick_xml::Reader;

use crate::error::{Result, XlsxCsvError};

/// Create a reader that keeps whitespace, since cell and string text is significant.
pub(crate) fn reader<R: BufRead>(source: R) -> Reader<R> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(false);
    reader
}

/// Raw bytes of the attribute whose local name is `key` (so `r:id` matches `id`).
pub(crate) fn attr_raw<'a>(e: &'a BytesStart<'a>, key: &[u8]) -> Option<Cow<'a, [u8]>> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == key)
        .map(|attr| attr.value)
}

/// Unescaped string value of the attribute whose local name is `key`.
pub(crate) fn attr_string(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == key {
            return Some(match attr.unescape_value() {
                Ok(value) => value.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            });
        }
    }
    None
}

/// Unescaped text content, with the failing part named in the error.
pub(crate) fn text<'a>(e: &'a BytesText<'a>, part: &str) -> Result<Cow<'a, str>> {
    e.unescape().map_err(|err| XlsxCsvError::xml(part, err))
}
