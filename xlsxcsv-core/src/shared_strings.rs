//! Workbook shared-string table.

use std::io::BufRead;

use log::debug;
use quick_xml::events::Event;

use crate::error::{Result, XlsxCsvError};
use crate::xml;

const PART: &str = "sharedStrings.xml";

/// Index-addressed text values shared by every worksheet of a workbook.
///
/// A workbook without a shared-strings part gets [`SharedStringTable::missing`];
/// looking anything up in it is an error, raised only when a cell actually
/// asks for a shared string.
#[derive(Clone, Debug, Default)]
pub struct SharedStringTable {
    strings: Option<Vec<String>>,
}

impl SharedStringTable {
    /// Table for a workbook that has no shared-strings part.
    pub fn missing() -> Self {
        SharedStringTable { strings: None }
    }

    /// Build a table from already decoded strings, in index order.
    pub fn from_strings<I, S>(strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SharedStringTable {
            strings: Some(strings.into_iter().map(Into::into).collect()),
        }
    }

    /// Stream the shared-strings part once.
    ///
    /// Every `<si>` item becomes the next index. All `<t>` runs inside the item
    /// are concatenated in document order; phonetic `<rPh>` runs are skipped.
    /// An item without text maps to the empty string.
    pub fn load<R: BufRead>(source: R) -> Result<Self> {
        let mut reader = xml::reader(source);
        let mut buf = Vec::new();

        let mut strings = Vec::new();
        let mut current = String::new();
        let mut in_item = false;
        let mut in_text = false;
        let mut phonetic_depth = 0usize;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"si" => {
                        in_item = true;
                        current.clear();
                    }
                    b"rPh" => phonetic_depth += 1,
                    b"t" => in_text = in_item && phonetic_depth == 0,
                    _ => {}
                },
                Ok(Event::Empty(e)) => {
                    // <si/> is a legitimate empty entry
                    if e.local_name().as_ref() == b"si" {
                        strings.push(String::new());
                    }
                }
                Ok(Event::Text(e)) => {
                    if in_text {
                        current.push_str(&xml::text(&e, PART)?);
                    }
                }
                Ok(Event::CData(e)) => {
                    if in_text {
                        current.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"t" => in_text = false,
                    b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                    b"si" => {
                        strings.push(std::mem::take(&mut current));
                        in_item = false;
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxCsvError::xml(PART, e)),
                _ => {}
            }
            buf.clear();
        }

        debug!("Loaded {} shared strings", strings.len());
        Ok(SharedStringTable {
            strings: Some(strings),
        })
    }

    /// Whether the workbook has a shared-strings part at all.
    pub fn is_present(&self) -> bool {
        self.strings.is_some()
    }

    pub fn len(&self) -> usize {
        self.strings.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up an entry by position.
    ///
    /// `Ok(None)` for an index past the end; `Err(MissingPart)` when the
    /// workbook has no shared-strings part. The caller fills in the sheet and
    /// cell.
    pub fn get(&self, index: usize) -> Result<Option<&str>> {
        match &self.strings {
            Some(strings) => Ok(strings.get(index).map(String::as_str)),
            None => Err(XlsxCsvError::MissingPart {
                sheet: String::new(),
                cell: String::new(),
                part: "shared strings".to_string(),
            }),
        }
    }
}
