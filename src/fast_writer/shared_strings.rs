//! Shared strings table (`xl/sharedStrings.xml`)

use super::xml_writer::XmlWriter;
use crate::error::Result;
use indexmap::IndexSet;
use std::io::Write;

/// Deduplicated cell strings in first-seen order; a cell stores the index
#[derive(Debug, Default)]
pub struct SharedStrings {
    strings: IndexSet<String>,
    references: u64,
}

impl SharedStrings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `value`, inserting it if unseen
    pub fn add_string(&mut self, value: &str) -> usize {
        self.references += 1;
        match self.strings.get_index_of(value) {
            Some(idx) => idx,
            None => self.strings.insert_full(value.to_string()).0,
        }
    }

    /// Number of distinct strings
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn write_xml<W: Write>(&self, xml: &mut XmlWriter<W>) -> Result<()> {
        xml.declaration()?;
        xml.start_element("sst")?;
        xml.attribute(
            "xmlns",
            "http://schemas.openxmlformats.org/spreadsheetml/2006/main",
        )?;
        xml.attribute_int("count", self.references)?;
        xml.attribute_int("uniqueCount", self.strings.len() as u64)?;
        xml.close_start_tag()?;

        for s in &self.strings {
            xml.write_raw(b"<si>")?;
            if needs_space_preserve(s) {
                xml.write_raw(b"<t xml:space=\"preserve\">")?;
            } else {
                xml.write_raw(b"<t>")?;
            }
            xml.text(s)?;
            xml.write_raw(b"</t></si>")?;
        }

        xml.end_element("sst")?;
        xml.flush()
    }
}

fn needs_space_preserve(s: &str) -> bool {
    s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_index() {
        let mut sst = SharedStrings::new();
        assert_eq!(sst.add_string("a"), 0);
        assert_eq!(sst.add_string("b"), 1);
        assert_eq!(sst.add_string("a"), 0);
        assert_eq!(sst.len(), 2);
    }

    #[test]
    fn test_xml_output() {
        let mut sst = SharedStrings::new();
        sst.add_string("x & y");
        sst.add_string(" padded");
        sst.add_string("x & y");

        let mut out = Vec::new();
        sst.write_xml(&mut XmlWriter::new(&mut out)).unwrap();
        let xml = String::from_utf8(out).unwrap();

        assert!(xml.contains("count=\"3\" uniqueCount=\"2\""));
        assert!(xml.contains("<si><t>x &amp; y</t></si>"));
        assert!(xml.contains("<si><t xml:space=\"preserve\"> padded</t></si>"));
    }
}
