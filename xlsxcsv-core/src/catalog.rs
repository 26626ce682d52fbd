//! Workbook sheet list and sheet selection.

use std::io::BufRead;

use log::debug;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Result, XlsxCsvError};
use crate::utils::{parse_u32_bytes, sanitize_file_name};
use crate::xml;

const PART: &str = "workbook.xml";

/// Visibility of a sheet as declared by its `state` attribute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SheetState {
    #[default]
    Visible,
    Hidden,
    VeryHidden,
}

impl SheetState {
    fn from_attr(value: Option<&str>) -> Self {
        match value {
            Some("hidden") => SheetState::Hidden,
            Some("veryHidden") => SheetState::VeryHidden,
            _ => SheetState::Visible,
        }
    }

    pub fn is_hidden(self) -> bool {
        self != SheetState::Visible
    }
}

/// A `<sheet>` entry of the workbook part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    pub sheet_id: Option<u32>,
    pub relationship_id: String,
    pub state: SheetState,
}

/// A sheet chosen for conversion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SheetDescriptor {
    pub relationship_id: String,
    pub sheet_id: Option<u32>,
    pub name: String,
    /// Output name, already safe to use as a file name.
    pub rename: String,
    pub hidden: bool,
}

/// Which sheets to convert and what to call them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SheetSelection {
    /// Sheet names to convert; empty selects every visible sheet.
    pub names: Vec<String>,
    /// Output names, paired by position with the selected sheets.
    pub renames: Vec<String>,
    /// Also consider hidden and very hidden sheets.
    pub include_hidden: bool,
}

impl SheetSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_renames<I, S>(mut self, renames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.renames = renames.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_include_hidden(mut self, include_hidden: bool) -> Self {
        self.include_hidden = include_hidden;
        self
    }
}

/// Every sheet the workbook part declares, in workbook order.
#[derive(Clone, Debug, Default)]
pub struct SheetCatalog {
    entries: Vec<SheetEntry>,
}

impl SheetCatalog {
    pub fn from_entries(entries: Vec<SheetEntry>) -> Self {
        SheetCatalog { entries }
    }

    /// Stream the workbook part, keeping every `<sheet>` that has both a name
    /// and a relationship id.
    pub fn load<R: BufRead>(source: R) -> Result<Self> {
        let mut reader = xml::reader(source);
        let mut buf = Vec::new();
        let mut entries = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                    if e.local_name().as_ref() == b"sheet" {
                        if let Some(entry) = read_sheet(&e) {
                            entries.push(entry);
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxCsvError::xml(PART, e)),
                _ => {}
            }
            buf.clear();
        }

        debug!("Workbook declares {} sheets", entries.len());
        Ok(SheetCatalog { entries })
    }

    /// Load the workbook part and resolve `selection` against it in one step.
    pub fn build<R: BufRead>(source: R, selection: &SheetSelection) -> Result<Vec<SheetDescriptor>> {
        Self::load(source)?.select(selection)
    }

    pub fn entries(&self) -> &[SheetEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of the sheets a selection can see, in workbook order.
    pub fn visible_names(&self, include_hidden: bool) -> Vec<&str> {
        self.discovered(include_hidden).map(|e| e.name.as_str()).collect()
    }

    fn discovered(&self, include_hidden: bool) -> impl Iterator<Item = &SheetEntry> {
        self.entries
            .iter()
            .filter(move |e| include_hidden || !e.state.is_hidden())
    }

    /// Resolve a selection into the ordered list of sheets to convert.
    ///
    /// Every requested name that is not among the discovered sheets is
    /// reported at once. Names and renames pair up by position; a name
    /// requested twice is converted twice.
    pub fn select(&self, selection: &SheetSelection) -> Result<Vec<SheetDescriptor>> {
        let discovered: Vec<&SheetEntry> = self.discovered(selection.include_hidden).collect();

        let names: Vec<&str> = if selection.names.is_empty() {
            discovered.iter().map(|e| e.name.as_str()).collect()
        } else {
            selection.names.iter().map(String::as_str).collect()
        };

        let mut missing: Vec<String> = Vec::new();
        for name in &names {
            if !discovered.iter().any(|e| e.name == *name) && !missing.iter().any(|m| m == name) {
                missing.push((*name).to_string());
            }
        }
        if !missing.is_empty() {
            return Err(XlsxCsvError::UnknownSheet { missing });
        }

        let renames: Vec<&str> = if selection.renames.is_empty() {
            names.clone()
        } else {
            selection.renames.iter().map(String::as_str).collect()
        };
        if renames.len() != names.len() {
            return Err(XlsxCsvError::RenameCountMismatch {
                names: names.len(),
                renames: renames.len(),
            });
        }

        let mut descriptors = Vec::with_capacity(names.len());
        for (name, rename) in names.iter().zip(renames) {
            // Presence was checked above.
            if let Some(entry) = discovered.iter().find(|e| e.name == *name) {
                descriptors.push(SheetDescriptor {
                    relationship_id: entry.relationship_id.clone(),
                    sheet_id: entry.sheet_id,
                    name: entry.name.clone(),
                    rename: sanitize_file_name(rename),
                    hidden: entry.state.is_hidden(),
                });
            }
        }
        Ok(descriptors)
    }
}

fn read_sheet(e: &BytesStart<'_>) -> Option<SheetEntry> {
    let name = xml::attr_string(e, b"name")?;
    let relationship_id = xml::attr_string(e, b"id").filter(|id| !id.is_empty())?;
    let sheet_id = xml::attr_raw(e, b"sheetId").and_then(|v| parse_u32_bytes(&v));
    let state = SheetState::from_attr(xml::attr_string(e, b"state").as_deref());
    Some(SheetEntry {
        name,
        sheet_id,
        relationship_id,
        state,
    })
}
