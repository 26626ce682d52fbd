//! The OOXML container: ZIP access and relationship-based part resolution.

#[cfg(feature = "fast-hash")]
use hashbrown::HashMap;
#[cfg(not(feature = "fast-hash"))]
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use quick_xml::events::Event;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{Result, XlsxCsvError};
use crate::xml;

const ROOT_RELS: &str = "_rels/.rels";
const DEFAULT_WORKBOOK: &str = "xl/workbook.xml";
const DEFAULT_SHARED_STRINGS: &str = "xl/sharedStrings.xml";
const DEFAULT_STYLES: &str = "xl/styles.xml";

const REL_OFFICE_DOCUMENT: &str = "/officeDocument";
const REL_WORKSHEET: &str = "/worksheet";
const REL_SHARED_STRINGS: &str = "/sharedStrings";
const REL_STYLES: &str = "/styles";

/// One `<Relationship>` of a `.rels` part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

impl Relationship {
    /// Relationship types differ between transitional and strict namespaces
    /// but share the trailing segment.
    fn is(&self, suffix: &str) -> bool {
        self.rel_type.ends_with(suffix)
    }
}

/// Parse a `.rels` part.
pub fn parse_relationships<R: BufRead>(source: R, part: &str) -> Result<Vec<Relationship>> {
    let mut reader = xml::reader(source);
    let mut buf = Vec::new();
    let mut relationships = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"Relationship" {
                    let id = xml::attr_string(&e, b"Id");
                    let target = xml::attr_string(&e, b"Target");
                    if let (Some(id), Some(target)) = (id, target) {
                        relationships.push(Relationship {
                            id,
                            rel_type: xml::attr_string(&e, b"Type").unwrap_or_default(),
                            target,
                            external: xml::attr_string(&e, b"TargetMode").as_deref()
                                == Some("External"),
                        });
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxCsvError::xml(part, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(relationships)
}

/// Resolve a relationship target against the directory of its source part.
///
/// Absolute targets start at the package root. `.` and `..` segments are
/// collapsed; `..` never climbs above the root.
pub fn resolve_target(base_dir: &str, target: &str) -> String {
    let target = target.replace('\\', "/");
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None if base_dir.is_empty() => target,
        None => format!("{}/{}", base_dir, target),
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Directory and file name of a part path.
fn split_part(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    }
}

/// Path of the `.rels` part describing `part`.
pub fn rels_path_for(part: &str) -> String {
    match split_part(part) {
        ("", file) => format!("_rels/{}.rels", file),
        (dir, file) => format!("{}/_rels/{}.rels", dir, file),
    }
}

#[derive(Clone, Debug)]
enum Source {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
}

/// A readable handle on the package bytes: a file or a shared in-memory copy.
pub enum PackageReader {
    File(BufReader<File>),
    Memory(Cursor<Arc<[u8]>>),
}

impl Read for PackageReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            PackageReader::File(r) => r.read(buf),
            PackageReader::Memory(r) => r.read(buf),
        }
    }
}

impl Seek for PackageReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            PackageReader::File(r) => r.seek(pos),
            PackageReader::Memory(r) => r.seek(pos),
        }
    }
}

/// An opened spreadsheet package with its parts located.
///
/// The package keeps its source rather than one archive handle, so every
/// worksheet conversion can open an independent reader.
#[derive(Clone, Debug)]
pub struct Package {
    source: Source,
    workbook_path: String,
    worksheet_paths: HashMap<String, String>,
    /// Whether the workbook part has a relationships part at all.
    has_workbook_rels: bool,
    shared_strings_path: Option<String>,
    styles_path: Option<String>,
}

impl Package {
    /// Open a package from a file path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = Source::Path(path.to_path_buf());
        // Surface a missing file as such rather than as a ZIP error.
        File::open(path).map_err(|e| {
            XlsxCsvError::Io(io::Error::new(
                e.kind(),
                format!("Failed to open file '{}': {}", path.display(), e),
            ))
        })?;
        Self::from_source(source)
    }

    /// Open a package held in memory.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes: Vec<u8> = bytes.into();
        Self::from_source(Source::Bytes(Arc::from(bytes)))
    }

    fn from_source(source: Source) -> Result<Self> {
        let mut archive = open_archive(&source)?;

        let workbook_path = match read_optional(&mut archive, ROOT_RELS)? {
            Some(rels) => rels
                .iter()
                .find(|r| r.is(REL_OFFICE_DOCUMENT) && !r.external)
                .map(|r| resolve_target("", &r.target))
                .unwrap_or_else(|| DEFAULT_WORKBOOK.to_string()),
            None => DEFAULT_WORKBOOK.to_string(),
        };
        if archive.index_for_name(&workbook_path).is_none() {
            return Err(XlsxCsvError::InvalidFormat(format!(
                "workbook part '{}' not found in package",
                workbook_path
            )));
        }

        let (workbook_dir, _) = split_part(&workbook_path);
        let workbook_rels = read_optional(&mut archive, &rels_path_for(&workbook_path))?;
        let has_workbook_rels = workbook_rels.is_some();
        let workbook_rels = workbook_rels.unwrap_or_default();

        let mut worksheet_paths = HashMap::new();
        let mut shared_strings_path = None;
        let mut styles_path = None;
        for rel in workbook_rels.iter().filter(|r| !r.external) {
            let path = resolve_target(workbook_dir, &rel.target);
            if rel.is(REL_WORKSHEET) {
                worksheet_paths.insert(rel.id.clone(), path);
            } else if rel.is(REL_SHARED_STRINGS) {
                shared_strings_path = Some(path);
            } else if rel.is(REL_STYLES) {
                styles_path = Some(path);
            }
        }

        let shared_strings_path = shared_strings_path
            .or_else(|| Some(DEFAULT_SHARED_STRINGS.to_string()))
            .filter(|p| archive.index_for_name(p).is_some());
        let styles_path = styles_path
            .or_else(|| Some(DEFAULT_STYLES.to_string()))
            .filter(|p| archive.index_for_name(p).is_some());

        debug!(
            "Package parts: workbook={}, worksheets={}, sharedStrings={:?}, styles={:?}",
            workbook_path,
            worksheet_paths.len(),
            shared_strings_path,
            styles_path
        );

        Ok(Package {
            source,
            workbook_path,
            worksheet_paths,
            has_workbook_rels,
            shared_strings_path,
            styles_path,
        })
    }

    /// A fresh, independent archive handle.
    pub fn archive(&self) -> Result<ZipArchive<PackageReader>> {
        open_archive(&self.source)
    }

    /// The file this package was opened from, if any.
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            Source::Path(path) => Some(path),
            Source::Bytes(_) => None,
        }
    }

    pub fn workbook_path(&self) -> &str {
        &self.workbook_path
    }

    pub fn shared_strings_path(&self) -> Option<&str> {
        self.shared_strings_path.as_deref()
    }

    pub fn styles_path(&self) -> Option<&str> {
        self.styles_path.as_deref()
    }

    /// Part path of the worksheet a workbook relationship id points to.
    pub fn worksheet_path(&self, relationship_id: &str) -> Option<&str> {
        self.worksheet_paths.get(relationship_id).map(String::as_str)
    }

    /// Locate a sheet's worksheet part. Without workbook relationships the
    /// conventional `xl/worksheets/sheet{sheetId}.xml` is assumed.
    pub fn locate_worksheet(&self, relationship_id: &str, sheet_id: Option<u32>) -> Option<String> {
        match self.worksheet_path(relationship_id) {
            Some(path) => Some(path.to_string()),
            None if !self.has_workbook_rels => {
                sheet_id.map(|id| format!("xl/worksheets/sheet{}.xml", id))
            }
            None => None,
        }
    }
}

fn open_archive(source: &Source) -> Result<ZipArchive<PackageReader>> {
    let reader = match source {
        Source::Path(path) => PackageReader::File(BufReader::new(File::open(path)?)),
        Source::Bytes(bytes) => PackageReader::Memory(Cursor::new(Arc::clone(bytes))),
    };
    Ok(ZipArchive::new(reader)?)
}

/// Parse a `.rels` part if the package has it.
fn read_optional(
    archive: &mut ZipArchive<PackageReader>,
    path: &str,
) -> Result<Option<Vec<Relationship>>> {
    match archive.by_name(path) {
        Ok(file) => parse_relationships(BufReader::new(file), path).map(Some),
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
