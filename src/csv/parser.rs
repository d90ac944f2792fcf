//! CSV record parsing with RFC 4180-like quoting

/// Splits CSV records into fields for a fixed delimiter
#[derive(Debug, Clone, Copy)]
pub struct CsvParser {
    delimiter: u8,
    quote_char: u8,
}

impl CsvParser {
    /// Create a parser with custom delimiter and quote character
    pub fn new(delimiter: u8, quote_char: u8) -> Self {
        Self {
            delimiter,
            quote_char,
        }
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// Parse one record into fields
    pub fn parse_record(&self, record: &str) -> Vec<String> {
        let mut fields = Vec::new();
        self.parse_record_into(record, &mut fields);
        fields
    }

    /// Parse one record into `fields`, replacing its previous contents
    ///
    /// A quote opens a quoted section only as the first character of a
    /// field; anywhere else it is data (`5" tv` stays `5" tv`). Text after
    /// a closing quote is kept as data up to the next delimiter.
    ///
    /// A record may span several physical lines when a quoted field contains
    /// a line break; callers join those lines before parsing (see
    /// [`CsvParser::is_record_complete`]).
    pub fn parse_record_into(&self, record: &str, fields: &mut Vec<String>) {
        fields.clear();
        let quote = self.quote_char as char;
        let delimiter = self.delimiter as char;
        let mut current = String::new();
        let mut state = FieldState::Start;
        let mut chars = record.chars().peekable();

        while let Some(ch) = chars.next() {
            state = match state {
                FieldState::Quoted if ch == quote => {
                    // "" inside a quoted field is a literal quote
                    if chars.peek() == Some(&quote) {
                        chars.next();
                        current.push(quote);
                        FieldState::Quoted
                    } else {
                        FieldState::Unquoted
                    }
                }
                FieldState::Quoted => {
                    current.push(ch);
                    FieldState::Quoted
                }
                _ if ch == delimiter => {
                    fields.push(std::mem::take(&mut current));
                    FieldState::Start
                }
                FieldState::Start if ch == quote => FieldState::Quoted,
                _ => {
                    current.push(ch);
                    FieldState::Unquoted
                }
            };
        }

        fields.push(current);
    }

    /// True when `text` does not end inside an open quoted field
    ///
    /// Follows the same field-start rule as [`CsvParser::parse_record_into`],
    /// so a stray quote inside an unquoted value never spans lines.
    pub fn is_record_complete(&self, text: &str) -> bool {
        let mut state = FieldState::Start;
        let mut bytes = text.bytes().peekable();

        while let Some(byte) = bytes.next() {
            state = match state {
                FieldState::Quoted if byte == self.quote_char => {
                    if bytes.peek() == Some(&self.quote_char) {
                        bytes.next();
                        FieldState::Quoted
                    } else {
                        FieldState::Unquoted
                    }
                }
                FieldState::Quoted => FieldState::Quoted,
                _ if byte == self.delimiter => FieldState::Start,
                FieldState::Start if byte == self.quote_char => FieldState::Quoted,
                _ => FieldState::Unquoted,
            };
        }

        state != FieldState::Quoted
    }
}

/// Where the scanner is within the current field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldState {
    Start,
    Unquoted,
    Quoted,
}

impl Default for CsvParser {
    fn default() -> Self {
        Self::new(b',', b'"')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple() {
        let parser = CsvParser::default();
        assert_eq!(parser.parse_record("a,b,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_quoted_delimiter() {
        let parser = CsvParser::default();
        assert_eq!(parser.parse_record(r#""a,b",c"#), vec!["a,b", "c"]);
    }

    #[test]
    fn test_escaped_quotes() {
        let parser = CsvParser::default();
        assert_eq!(
            parser.parse_record(r#""Say ""Hello""",world"#),
            vec![r#"Say "Hello""#, "world"]
        );
    }

    #[test]
    fn test_empty_fields_preserved() {
        let parser = CsvParser::default();
        assert_eq!(parser.parse_record("a,,c"), vec!["a", "", "c"]);
        assert_eq!(parser.parse_record(",,"), vec!["", "", ""]);
    }

    #[test]
    fn test_semicolon() {
        let parser = CsvParser::new(b';', b'"');
        assert_eq!(parser.parse_record(r#"a;"b;c";d"#), vec!["a", "b;c", "d"]);
        // commas are plain data under a semicolon delimiter
        assert_eq!(parser.parse_record("1,5;2,5"), vec!["1,5", "2,5"]);
    }

    #[test]
    fn test_parse_into_reuses_buffer() {
        let parser = CsvParser::default();
        let mut fields = vec!["stale".to_string()];
        parser.parse_record_into("x,y", &mut fields);
        assert_eq!(fields, vec!["x", "y"]);
    }

    #[test]
    fn test_record_completeness() {
        let parser = CsvParser::default();
        assert!(parser.is_record_complete("a,b"));
        assert!(parser.is_record_complete(r#""a,b",c"#));
        assert!(!parser.is_record_complete("\"Line 1"));
        assert!(parser.is_record_complete("\"Line 1\nLine 2\",normal"));
    }

    #[test]
    fn test_quote_inside_unquoted_field_is_data() {
        let parser = CsvParser::default();
        assert_eq!(parser.parse_record(r#"1,5" tv,3"#), vec!["1", "5\" tv", "3"]);
        assert_eq!(parser.parse_record(r#"a"b"c,d"#), vec![r#"a"b"c"#, "d"]);
        assert!(parser.is_record_complete(r#"1,5" tv,3"#));
        assert!(parser.is_record_complete(r#"1,"x",5" tv"#));
        assert!(!parser.is_record_complete(r#"1,"open 5"" tv"#));
    }

    #[test]
    fn test_text_after_closing_quote_kept() {
        let parser = CsvParser::default();
        assert_eq!(parser.parse_record(r#""ab"c,d"#), vec!["abc", "d"]);
    }

    #[test]
    fn test_multiline_field() {
        let parser = CsvParser::default();
        assert_eq!(
            parser.parse_record("\"Line 1\nLine 2\",normal"),
            vec!["Line 1\nLine 2", "normal"]
        );
    }
}
