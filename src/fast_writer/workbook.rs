//! Single-sheet XLSX writer that streams rows straight into the ZIP container

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use super::shared_strings::SharedStrings;
use super::xml_writer::XmlWriter;
use crate::error::{ExcelError, Result};

/// Worksheet name used when the caller has no preference
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

/// Excel's hard row limit per worksheet
pub const MAX_SHEET_ROWS: u32 = 1_048_576;

/// Style index of the bold header cell format in `styles.xml`
const HEADER_STYLE: u32 = 1;

/// Streaming workbook writer with one worksheet
///
/// Row XML is written into the worksheet entry as rows arrive, so memory is
/// bounded by the shared strings table rather than by the row count. The
/// remaining workbook parts are written by [`WorkbookWriter::close`], which
/// consumes the writer: a workbook is finalized exactly once.
pub struct WorkbookWriter {
    zip: ZipWriter<BufWriter<File>>,
    shared_strings: SharedStrings,
    sheet_name: String,
    current_row: u32,
    xml_buffer: Vec<u8>,
    cell_ref_cache: Vec<String>,
    flush_interval: u32,
}

impl WorkbookWriter {
    /// Create `path` and open its only worksheet
    pub fn create<P: AsRef<Path>>(path: P, sheet_name: &str) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::with_capacity(64 * 1024, file);
        let mut zip = ZipWriter::new(writer);
        let options = Self::file_options();

        zip.start_file("[Content_Types].xml", options)?;
        zip.write_all(CONTENT_TYPES.as_bytes())?;

        zip.start_file("_rels/.rels", options)?;
        zip.write_all(ROOT_RELS.as_bytes())?;

        zip.start_file("docProps/core.xml", options)?;
        Self::write_core_props(&mut zip)?;

        zip.start_file("docProps/app.xml", options)?;
        zip.write_all(APP_PROPS.as_bytes())?;

        // Worksheet stays the open entry until close()
        zip.start_file("xl/worksheets/sheet1.xml", options)?;
        {
            let mut xml = XmlWriter::new(&mut zip);
            xml.declaration()?;
            xml.start_element("worksheet")?;
            xml.attribute(
                "xmlns",
                "http://schemas.openxmlformats.org/spreadsheetml/2006/main",
            )?;
            xml.attribute(
                "xmlns:r",
                "http://schemas.openxmlformats.org/officeDocument/2006/relationships",
            )?;
            xml.close_start_tag()?;
            xml.write_raw(b"<sheetData>")?;
            xml.flush()?;
        }

        // Column letters for the first 100 columns (A..CV)
        let cell_ref_cache = (1..=100).map(col_to_letter).collect();

        Ok(WorkbookWriter {
            zip,
            shared_strings: SharedStrings::new(),
            sheet_name: sanitize_sheet_name(sheet_name),
            current_row: 0,
            xml_buffer: Vec::with_capacity(8192),
            cell_ref_cache,
            flush_interval: 1000,
        })
    }

    fn file_options() -> FileOptions {
        FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(6))
            .large_file(true)
    }

    /// Flush the ZIP stream every `interval` rows
    pub fn set_flush_interval(&mut self, interval: u32) {
        self.flush_interval = interval.max(1);
    }

    /// Write the header row in bold
    pub fn write_header<S: AsRef<str>>(&mut self, values: &[S]) -> Result<()> {
        self.append_row(values, HEADER_STYLE)
    }

    /// Append a row of text cells; empty values become empty text cells
    pub fn write_row<S: AsRef<str>>(&mut self, values: &[S]) -> Result<()> {
        self.append_row(values, 0)
    }

    fn append_row<S: AsRef<str>>(&mut self, values: &[S], style: u32) -> Result<()> {
        if self.current_row >= MAX_SHEET_ROWS {
            return Err(ExcelError::WriteError(format!(
                "worksheet row limit of {} reached",
                MAX_SHEET_ROWS
            )));
        }

        self.current_row += 1;
        let mut row_digits = itoa::Buffer::new();
        let row_num = row_digits.format(self.current_row);

        self.xml_buffer.clear();
        self.xml_buffer.extend_from_slice(b"<row r=\"");
        self.xml_buffer.extend_from_slice(row_num.as_bytes());
        self.xml_buffer.extend_from_slice(b"\">");

        let mut index_digits = itoa::Buffer::new();
        for (col_idx, value) in values.iter().enumerate() {
            let string_index = self.shared_strings.add_string(value.as_ref());

            self.xml_buffer.extend_from_slice(b"<c r=\"");
            match self.cell_ref_cache.get(col_idx) {
                Some(letter) => self.xml_buffer.extend_from_slice(letter.as_bytes()),
                None => self
                    .xml_buffer
                    .extend_from_slice(col_to_letter(col_idx as u32 + 1).as_bytes()),
            }
            self.xml_buffer.extend_from_slice(row_num.as_bytes());
            self.xml_buffer.extend_from_slice(b"\"");
            if style > 0 {
                self.xml_buffer.extend_from_slice(b" s=\"");
                self.xml_buffer
                    .extend_from_slice(index_digits.format(style).as_bytes());
                self.xml_buffer.extend_from_slice(b"\"");
            }
            self.xml_buffer.extend_from_slice(b" t=\"s\"><v>");
            self.xml_buffer
                .extend_from_slice(index_digits.format(string_index).as_bytes());
            self.xml_buffer.extend_from_slice(b"</v></c>");
        }

        self.xml_buffer.extend_from_slice(b"</row>");
        self.zip.write_all(&self.xml_buffer)?;

        if self.current_row.is_multiple_of(self.flush_interval) {
            self.zip.flush()?;
        }

        Ok(())
    }

    /// Rows written so far, header included
    pub fn rows_written(&self) -> u32 {
        self.current_row
    }

    /// Finish the worksheet, write the remaining parts and close the file
    pub fn close(mut self) -> Result<()> {
        let options = Self::file_options();

        {
            let mut xml = XmlWriter::new(&mut self.zip);
            xml.end_element("sheetData")?;
            xml.end_element("worksheet")?;
            xml.flush()?;
        }

        self.zip.start_file("xl/sharedStrings.xml", options)?;
        self.shared_strings
            .write_xml(&mut XmlWriter::new(&mut self.zip))?;

        self.zip.start_file("xl/workbook.xml", options)?;
        self.write_workbook_xml()?;

        self.zip.start_file("xl/_rels/workbook.xml.rels", options)?;
        self.zip.write_all(WORKBOOK_RELS.as_bytes())?;

        self.zip.start_file("xl/styles.xml", options)?;
        self.zip.write_all(STYLES.as_bytes())?;

        let mut writer = self.zip.finish()?;
        writer.flush()?;
        Ok(())
    }

    fn write_core_props<W: Write>(writer: &mut W) -> Result<()> {
        let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let mut xml = XmlWriter::new(writer);
        xml.declaration()?;
        xml.write_str(concat!(
            "<cp:coreProperties",
            " xmlns:cp=\"http://schemas.openxmlformats.org/package/2006/metadata/core-properties\"",
            " xmlns:dc=\"http://purl.org/dc/elements/1.1/\"",
            " xmlns:dcterms=\"http://purl.org/dc/terms/\"",
            " xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">",
            "<dc:creator>excelerate</dc:creator>",
            "<cp:lastModifiedBy>excelerate</cp:lastModifiedBy>",
        ))?;
        for tag in ["dcterms:created", "dcterms:modified"] {
            xml.start_element(tag)?;
            xml.attribute("xsi:type", "dcterms:W3CDTF")?;
            xml.close_start_tag()?;
            xml.text(&now)?;
            xml.end_element(tag)?;
        }
        xml.end_element("cp:coreProperties")?;
        xml.flush()
    }

    fn write_workbook_xml(&mut self) -> Result<()> {
        let mut xml = XmlWriter::new(&mut self.zip);
        xml.declaration()?;
        xml.start_element("workbook")?;
        xml.attribute(
            "xmlns",
            "http://schemas.openxmlformats.org/spreadsheetml/2006/main",
        )?;
        xml.attribute(
            "xmlns:r",
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships",
        )?;
        xml.close_start_tag()?;
        xml.write_raw(b"<sheets>")?;
        xml.start_element("sheet")?;
        xml.attribute("name", &self.sheet_name)?;
        xml.attribute_int("sheetId", 1)?;
        xml.attribute("r:id", "rId1")?;
        xml.close_empty()?;
        xml.write_raw(b"</sheets>")?;
        xml.end_element("workbook")?;
        xml.flush()
    }
}

/// 1-based column number to letters (1 -> A, 27 -> AA)
pub(crate) fn col_to_letter(col: u32) -> String {
    let mut letters = Vec::new();
    let mut n = col;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Excel sheet names: at most 31 characters, none of `[]:*?/\`
fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c => c,
        })
        .take(31)
        .collect();
    let cleaned = cleaned.trim_matches('\'').to_string();
    if cleaned.trim().is_empty() {
        DEFAULT_SHEET_NAME.to_string()
    } else {
        cleaned
    }
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>
<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
<Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>
</Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>
</Relationships>"#;

const APP_PROPS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties">
<Application>excelerate</Application>
<DocSecurity>0</DocSecurity>
<ScaleCrop>false</ScaleCrop>
<LinksUpToDate>false</LinksUpToDate>
<SharedDoc>false</SharedDoc>
<HyperlinksChanged>false</HyperlinksChanged>
<AppVersion>1.0</AppVersion>
</Properties>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>
</Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<fonts count="2">
<font><sz val="11"/><name val="Calibri"/></font>
<font><b/><sz val="11"/><name val="Calibri"/></font>
</fonts>
<fills count="2">
<fill><patternFill patternType="none"/></fill>
<fill><patternFill patternType="gray125"/></fill>
</fills>
<borders count="1">
<border><left/><right/><top/><bottom/><diagonal/></border>
</borders>
<cellStyleXfs count="1">
<xf numFmtId="0" fontId="0" fillId="0" borderId="0"/>
</cellStyleXfs>
<cellXfs count="2">
<xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>
<xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/>
</cellXfs>
</styleSheet>"#;
