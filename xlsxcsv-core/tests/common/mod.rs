//! In-memory xlsx packages for integration tests.
#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

struct SheetFixture {
    name: String,
    state: Option<String>,
    xml: String,
}

/// A minimal workbook laid out the way Excel writes it.
#[derive(Default)]
pub struct Book {
    sheets: Vec<SheetFixture>,
    shared_strings: Option<Vec<String>>,
    styles: Option<String>,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sheet(mut self, name: &str, xml: impl Into<String>) -> Self {
        self.sheets.push(SheetFixture {
            name: name.to_string(),
            state: None,
            xml: xml.into(),
        });
        self
    }

    pub fn hidden_sheet(mut self, name: &str, state: &str, xml: impl Into<String>) -> Self {
        self.sheets.push(SheetFixture {
            name: name.to_string(),
            state: Some(state.to_string()),
            xml: xml.into(),
        });
        self
    }

    pub fn shared_strings(mut self, strings: &[&str]) -> Self {
        self.shared_strings = Some(strings.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Styles part whose `cellXfs` list uses the given number format ids, in order.
    pub fn cell_formats(mut self, custom: &[(u32, &str)], format_ids: &[u32]) -> Self {
        let mut xml = format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><styleSheet xmlns="{}">"#, MAIN_NS);
        if !custom.is_empty() {
            xml.push_str(&format!(r#"<numFmts count="{}">"#, custom.len()));
            for (id, code) in custom {
                xml.push_str(&format!(r#"<numFmt numFmtId="{}" formatCode="{}"/>"#, id, escape(code)));
            }
            xml.push_str("</numFmts>");
        }
        xml.push_str(r#"<fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>"#);
        xml.push_str(&format!(r#"<cellXfs count="{}">"#, format_ids.len()));
        for id in format_ids {
            xml.push_str(&format!(r#"<xf numFmtId="{}" fontId="0" fillId="0" borderId="0" xfId="0"/>"#, id));
        }
        xml.push_str("</cellXfs></styleSheet>");
        self.styles = Some(xml);
        self
    }

    pub fn parts(&self) -> Vec<(String, String)> {
        let mut parts = Vec::new();

        let content_types = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/></Types>"#;
        parts.push(("[Content_Types].xml".to_string(), content_types.to_string()));

        parts.push((
            "_rels/.rels".to_string(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#,
                REL_NS
            ),
        ));

        let mut workbook = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="{}" xmlns:r="{}"><sheets>"#,
            MAIN_NS, REL_NS
        );
        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for (i, sheet) in self.sheets.iter().enumerate() {
            let n = i + 1;
            let state = sheet
                .state
                .as_ref()
                .map(|s| format!(r#" state="{}""#, s))
                .unwrap_or_default();
            workbook.push_str(&format!(
                r#"<sheet name="{}" sheetId="{}"{} r:id="rId{}"/>"#,
                escape(&sheet.name),
                n,
                state,
                n
            ));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="{}/worksheet" Target="worksheets/sheet{}.xml"/>"#,
                n, REL_NS, n
            ));
            parts.push((format!("xl/worksheets/sheet{}.xml", n), sheet.xml.clone()));
        }
        workbook.push_str("</sheets></workbook>");

        let next = self.sheets.len() + 1;
        if let Some(strings) = &self.shared_strings {
            rels.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="{}/sharedStrings" Target="sharedStrings.xml"/>"#,
                next, REL_NS
            ));
            let mut sst = format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><sst xmlns="{}" count="{}" uniqueCount="{}">"#,
                MAIN_NS,
                strings.len(),
                strings.len()
            );
            for s in strings {
                sst.push_str(&format!(r#"<si><t xml:space="preserve">{}</t></si>"#, escape(s)));
            }
            sst.push_str("</sst>");
            parts.push(("xl/sharedStrings.xml".to_string(), sst));
        }
        if let Some(styles) = &self.styles {
            rels.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="{}/styles" Target="styles.xml"/>"#,
                next + 1,
                REL_NS
            ));
            parts.push(("xl/styles.xml".to_string(), styles.clone()));
        }
        rels.push_str("</Relationships>");

        parts.push(("xl/workbook.xml".to_string(), workbook));
        parts.push(("xl/_rels/workbook.xml.rels".to_string(), rels));
        parts
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let parts = self.parts();
        zip_parts(parts.iter().map(|(p, c)| (p.as_str(), c.as_str())))
    }

    pub fn write_to(&self, path: &Path) {
        std::fs::write(path, self.to_bytes()).unwrap();
    }
}

/// Zip arbitrary parts into a package.
pub fn zip_parts<'a>(parts: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (path, content) in parts {
        zip.start_file(path, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Worksheet XML with the given dimension and `<sheetData>` content.
pub fn worksheet(dimension: &str, rows: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="{}" xmlns:r="{}"><dimension ref="{}"/><sheetViews><sheetView workbookViewId="0"/></sheetViews><sheetData>{}</sheetData></worksheet>"#,
        MAIN_NS, REL_NS, dimension, rows
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
