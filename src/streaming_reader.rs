//! Read-back of produced workbooks
//!
//! Loads the first worksheet of an XLSX file as rows of strings. Used to
//! verify a conversion after the workbook is closed. Only the subset of
//! SpreadsheetML that this crate writes (shared and inline strings, plain
//! values) is understood; styles are ignored.

use crate::error::{ExcelError, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use zip::ZipArchive;

/// Reader for the first worksheet of an XLSX file
pub struct SheetReader {
    archive: ZipArchive<BufReader<File>>,
    sst: Vec<String>,
    sheet_name: String,
    sheet_path: String,
}

impl SheetReader {
    /// Open an XLSX file and load its shared strings
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .map_err(|e| ExcelError::ReadError(format!("Failed to open file: {}", e)))?;
        let mut archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| ExcelError::ReadError(format!("Failed to read ZIP: {}", e)))?;

        let sst = match read_entry(&mut archive, "xl/sharedStrings.xml") {
            Ok(xml) => parse_shared_strings(&xml),
            // No SST means every cell is inline
            Err(_) => Vec::new(),
        };
        let (sheet_name, sheet_path) = first_sheet(&mut archive)?;

        Ok(SheetReader {
            archive,
            sst,
            sheet_name,
            sheet_path,
        })
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// All rows of the first worksheet, gaps between cells filled with ""
    pub fn rows(&mut self) -> Result<Vec<Vec<String>>> {
        let xml = read_entry(&mut self.archive, &self.sheet_path)?;
        let mut rows = Vec::new();
        let mut pos = 0;

        while let Some(start) = xml[pos..].find("<row") {
            let start = pos + start;
            let Some(end) = xml[start..].find("</row>") else {
                // self-closing <row .../> carries no cells
                match xml[start..].find("/>") {
                    Some(close) => {
                        rows.push(Vec::new());
                        pos = start + close + 2;
                        continue;
                    }
                    None => break,
                }
            };
            let end = start + end + "</row>".len();
            rows.push(parse_row(&xml[start..end], &self.sst));
            pos = end;
        }

        Ok(rows)
    }

    /// Number of rows in the first worksheet
    pub fn row_count(&mut self) -> Result<usize> {
        Ok(self.rows()?.len())
    }
}

fn read_entry(archive: &mut ZipArchive<BufReader<File>>, name: &str) -> Result<String> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| ExcelError::ReadError(format!("Failed to open {}: {}", name, e)))?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| ExcelError::ReadError(format!("Failed to read {}: {}", name, e)))?;
    Ok(xml)
}

/// Name and archive path of the first `<sheet>` in workbook.xml
fn first_sheet(archive: &mut ZipArchive<BufReader<File>>) -> Result<(String, String)> {
    let workbook = read_entry(archive, "xl/workbook.xml")?;
    let tag_start = workbook
        .find("<sheet ")
        .ok_or_else(|| ExcelError::ReadError("workbook has no sheets".to_string()))?;
    let tag_end = workbook[tag_start..]
        .find('>')
        .map_or(workbook.len(), |e| tag_start + e);
    let tag = &workbook[tag_start..tag_end];

    let name = attribute(tag, "name").map(decode_xml_entities).unwrap_or_default();
    let rid = attribute(tag, "r:id")
        .ok_or_else(|| ExcelError::ReadError("sheet has no relationship id".to_string()))?;

    let rels = read_entry(archive, "xl/_rels/workbook.xml.rels")?;
    let id_attr = format!("Id=\"{}\"", rid);
    let rel_pos = rels
        .find(&id_attr)
        .ok_or_else(|| ExcelError::ReadError(format!("relationship {} not found", rid)))?;
    let rel_start = rels[..rel_pos].rfind("<Relationship").unwrap_or(0);
    let rel_end = rels[rel_pos..].find("/>").map_or(rels.len(), |e| rel_pos + e);
    let target = attribute(&rels[rel_start..rel_end], "Target")
        .ok_or_else(|| ExcelError::ReadError(format!("relationship {} has no target", rid)))?;

    let path = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    };
    Ok((name, path))
}

/// Value of `name="..."` inside a tag
fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!(" {}=\"", name);
    let start = tag.find(&needle)? + needle.len();
    let len = tag[start..].find('"')?;
    Some(&tag[start..start + len])
}

fn parse_shared_strings(xml: &str) -> Vec<String> {
    let mut sst = Vec::new();
    let mut pos = 0;
    while let Some(si_start) = xml[pos..].find("<si>") {
        let si_start = pos + si_start;
        let Some(si_len) = xml[si_start..].find("</si>") else {
            break;
        };
        let si_end = si_start + si_len;
        sst.push(collect_text(&xml[si_start..si_end]));
        pos = si_end + "</si>".len();
    }
    sst
}

/// Concatenated content of every `<t>` / `<t ...>` element in `xml`
fn collect_text(xml: &str) -> String {
    let mut text = String::new();
    let mut pos = 0;
    while let Some(t_start) = xml[pos..].find("<t") {
        let t_start = pos + t_start;
        let rest = &xml[t_start + 2..];
        // Skip tags that merely start with "t", e.g. <tab>
        if !rest.starts_with('>') && !rest.starts_with(' ') {
            pos = t_start + 2;
            continue;
        }
        let Some(open_end) = xml[t_start..].find('>') else {
            break;
        };
        let content_start = t_start + open_end + 1;
        let Some(content_len) = xml[content_start..].find("</t>") else {
            break;
        };
        text.push_str(&decode_xml_entities(
            &xml[content_start..content_start + content_len],
        ));
        pos = content_start + content_len + "</t>".len();
    }
    text
}

fn parse_row(row_xml: &str, sst: &[String]) -> Vec<String> {
    let mut row = Vec::new();
    let mut pos = 0;

    while let Some(cell_start) = row_xml[pos..].find("<c ") {
        let cell_start = pos + cell_start;
        let open_end = match row_xml[cell_start..].find('>') {
            Some(e) => cell_start + e,
            None => break,
        };
        let open_tag = &row_xml[cell_start..open_end];

        let col_idx = attribute(open_tag, "r")
            .map(parse_column_index)
            .unwrap_or(row.len());
        while row.len() < col_idx {
            row.push(String::new());
        }

        // <c .../> is an empty cell
        if open_tag.ends_with('/') {
            row.push(String::new());
            pos = open_end + 1;
            continue;
        }

        let cell_end = match row_xml[open_end..].find("</c>") {
            Some(e) => open_end + e,
            None => break,
        };
        let body = &row_xml[open_end + 1..cell_end];

        let value = match attribute(open_tag, "t") {
            Some("s") => element_text(body, "v")
                .and_then(|v| v.parse::<usize>().ok())
                .and_then(|idx| sst.get(idx).cloned())
                .unwrap_or_default(),
            Some("inlineStr") => collect_text(body),
            _ => element_text(body, "v")
                .map(decode_xml_entities)
                .unwrap_or_default(),
        };

        row.push(value);
        pos = cell_end + "</c>".len();
    }

    row
}

fn element_text<'a>(xml: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{}>", name);
    let close = format!("</{}>", name);
    let start = xml.find(&open)? + open.len();
    let len = xml[start..].find(&close)?;
    Some(&xml[start..start + len])
}

fn decode_xml_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Column index from a cell reference ("A1" -> 0, "AA1" -> 26)
fn parse_column_index(cell_ref: &str) -> usize {
    cell_ref
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .fold(0usize, |acc, ch| {
            acc * 26 + (ch.to_ascii_uppercase() as usize - 'A' as usize + 1)
        })
        .saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fast_writer::WorkbookWriter;

    #[test]
    fn test_parse_column_index() {
        assert_eq!(parse_column_index("A1"), 0);
        assert_eq!(parse_column_index("Z9"), 25);
        assert_eq!(parse_column_index("AA10"), 26);
    }

    #[test]
    fn test_parse_row_fills_gaps() {
        let sst = vec!["x".to_string(), "y".to_string()];
        let row = parse_row(
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="s"><v>1</v></c><c r="D1"><v>42</v></c></row>"#,
            &sst,
        );
        assert_eq!(row, vec!["x", "", "y", "42"]);
    }

    #[test]
    fn test_shared_strings_with_preserve() {
        let sst = parse_shared_strings(
            r#"<sst><si><t>a &amp; b</t></si><si><t xml:space="preserve"> pad </t></si><si><t></t></si></sst>"#,
        );
        assert_eq!(sst, vec!["a & b", " pad ", ""]);
    }

    #[test]
    fn test_read_back_written_workbook() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("roundtrip.xlsx");

        let mut writer = WorkbookWriter::create(&path, "people")?;
        writer.write_header(&["name", "note"])?;
        writer.write_row(&["Ann", "<tag> & \"quote\""])?;
        writer.write_row(&["Ben", ""])?;
        writer.close()?;

        let mut reader = SheetReader::open(&path)?;
        assert_eq!(reader.sheet_name(), "people");
        let rows = reader.rows()?;
        assert_eq!(
            rows,
            vec![
                vec!["name", "note"],
                vec!["Ann", "<tag> & \"quote\""],
                vec!["Ben", ""],
            ]
        );
        assert_eq!(reader.row_count()?, 3);
        Ok(())
    }
}
