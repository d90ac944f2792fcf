//! Buffered XML emitter for workbook parts

use crate::error::Result;
use std::io::Write;

/// Whether `c` may appear in an XML 1.0 document
///
/// Tab, LF, CR and U+0020..=U+D7FF, U+E000..=U+FFFD, U+10000 and up.
/// Surrogates cannot occur in a `char`.
#[inline]
pub fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}

/// Remove every character XML cannot carry; true if `value` changed
pub fn strip_invalid_xml(value: &mut String) -> bool {
    if value.chars().all(is_xml_char) {
        return false;
    }
    value.retain(is_xml_char);
    true
}

/// Append `text` to `buf` with XML escaping
///
/// Characters rejected by [`is_xml_char`] are left out. Callers that need
/// to know about the loss run [`strip_invalid_xml`] first.
pub(crate) fn escape_into(buf: &mut Vec<u8>, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => buf.extend_from_slice(b"&amp;"),
            '<' => buf.extend_from_slice(b"&lt;"),
            '>' => buf.extend_from_slice(b"&gt;"),
            '"' => buf.extend_from_slice(b"&quot;"),
            '\'' => buf.extend_from_slice(b"&apos;"),
            c if !is_xml_char(c) => {}
            c => {
                let mut utf8 = [0u8; 4];
                buf.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
            }
        }
    }
}

/// XML writer that batches small writes before handing them to `W`
pub struct XmlWriter<W: Write> {
    writer: W,
    buffer: Vec<u8>,
    flush_threshold: usize,
}

impl<W: Write> XmlWriter<W> {
    pub fn new(writer: W) -> Self {
        Self::with_capacity(writer, 8192)
    }

    pub fn with_capacity(writer: W, capacity: usize) -> Self {
        XmlWriter {
            writer,
            buffer: Vec::with_capacity(capacity),
            flush_threshold: capacity / 2,
        }
    }

    #[inline]
    fn auto_flush(&mut self) -> Result<()> {
        if self.buffer.len() >= self.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Write bytes that are already valid XML
    #[inline]
    pub fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(data);
        self.auto_flush()
    }

    #[inline]
    pub fn write_str(&mut self, s: &str) -> Result<()> {
        self.write_raw(s.as_bytes())
    }

    /// XML declaration line
    pub fn declaration(&mut self) -> Result<()> {
        self.write_raw(b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n")
    }

    /// `<name` without closing the tag, so attributes can follow
    #[inline]
    pub fn start_element(&mut self, name: &str) -> Result<()> {
        self.write_raw(b"<")?;
        self.write_str(name)
    }

    #[inline]
    pub fn close_start_tag(&mut self) -> Result<()> {
        self.write_raw(b">")
    }

    /// `/>` after attributes
    #[inline]
    pub fn close_empty(&mut self) -> Result<()> {
        self.write_raw(b"/>")
    }

    #[inline]
    pub fn end_element(&mut self, name: &str) -> Result<()> {
        self.write_raw(b"</")?;
        self.write_str(name)?;
        self.write_raw(b">")
    }

    #[inline]
    pub fn attribute(&mut self, name: &str, value: &str) -> Result<()> {
        self.write_raw(b" ")?;
        self.write_str(name)?;
        self.write_raw(b"=\"")?;
        escape_into(&mut self.buffer, value);
        self.write_raw(b"\"")
    }

    #[inline]
    pub fn attribute_int(&mut self, name: &str, value: u64) -> Result<()> {
        let mut digits = itoa::Buffer::new();
        self.write_raw(b" ")?;
        self.write_str(name)?;
        self.write_raw(b"=\"")?;
        self.write_str(digits.format(value))?;
        self.write_raw(b"\"")
    }

    /// Escaped character data
    #[inline]
    pub fn text(&mut self, text: &str) -> Result<()> {
        escape_into(&mut self.buffer, text);
        self.auto_flush()
    }

    /// Push buffered bytes to the underlying writer
    pub fn flush(&mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            self.writer.write_all(&self.buffer)?;
            self.buffer.clear();
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_with_attributes() {
        let mut output = Vec::new();
        let mut writer = XmlWriter::new(&mut output);

        writer.start_element("sheet").unwrap();
        writer.attribute("name", "Data").unwrap();
        writer.attribute_int("sheetId", 1).unwrap();
        writer.close_empty().unwrap();
        writer.flush().unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "<sheet name=\"Data\" sheetId=\"1\"/>"
        );
    }

    #[test]
    fn test_text_escaping() {
        let mut output = Vec::new();
        let mut writer = XmlWriter::new(&mut output);

        writer.text("<a & 'b'>").unwrap();
        writer.flush().unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "&lt;a &amp; &apos;b&apos;&gt;"
        );
    }

    #[test]
    fn test_control_characters_dropped() {
        let mut buf = Vec::new();
        escape_into(&mut buf, "a\u{1}b\tc\u{7f}");
        assert_eq!(String::from_utf8(buf).unwrap(), "ab\tc\u{7f}");
    }

    #[test]
    fn test_noncharacters_dropped() {
        let mut buf = Vec::new();
        escape_into(&mut buf, "x\u{FFFE}y\u{FFFF}z\u{FFFD}\u{1F600}");
        assert_eq!(String::from_utf8(buf).unwrap(), "xyz\u{FFFD}\u{1F600}");
    }

    #[test]
    fn test_strip_invalid_xml_reports_change() {
        let mut clean = String::from("plain \u{E000} text");
        assert!(!strip_invalid_xml(&mut clean));
        assert_eq!(clean, "plain \u{E000} text");

        let mut dirty = String::from("a\u{0}b\u{FFFF}c\u{1b}");
        assert!(strip_invalid_xml(&mut dirty));
        assert_eq!(dirty, "abc");

        assert!(!is_xml_char('\u{B}'));
        assert!(!is_xml_char('\u{FFFE}'));
        assert!(is_xml_char('\u{D7FF}'));
        assert!(is_xml_char('\u{10FFFF}'));
    }
}
