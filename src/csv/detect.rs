//! Delimiter detection from a file's leading sample

use crate::error::{ExcelError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Upper bound on how much of the first line is inspected
pub const DEFAULT_SAMPLE_BYTES: usize = 64 * 1024;

/// Candidate separators, in tie-break order
const CANDIDATES: [Delimiter; 2] = [Delimiter::Comma, Delimiter::Semicolon];

/// Column separator of a CSV file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    Comma,
    Semicolon,
}

impl Delimiter {
    pub fn as_byte(self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Semicolon => b';',
        }
    }

    pub fn as_char(self) -> char {
        self.as_byte() as char
    }
}

/// Classifies the separator of a CSV sample by occurrence count
///
/// Only `,` and `;` are candidates. Occurrences inside double-quoted sections
/// are ignored. The most frequent candidate wins; a tie goes to comma.
#[derive(Debug, Clone, Copy)]
pub struct DelimiterDetector {
    sample_bytes: usize,
}

impl Default for DelimiterDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_BYTES)
    }
}

impl DelimiterDetector {
    pub fn new(sample_bytes: usize) -> Self {
        Self {
            sample_bytes: sample_bytes.max(1),
        }
    }

    /// Detect the delimiter in an in-memory sample
    pub fn detect(&self, sample: &[u8]) -> Result<Delimiter> {
        if sample.is_empty() {
            return Err(ExcelError::Detection("sample is empty".to_string()));
        }

        let mut counts = [0usize; CANDIDATES.len()];
        let mut in_quotes = false;
        let mut field_start = true;
        let mut bytes = sample.iter().copied().peekable();
        while let Some(byte) = bytes.next() {
            if in_quotes {
                if byte == b'"' {
                    if bytes.peek() == Some(&b'"') {
                        bytes.next();
                    } else {
                        in_quotes = false;
                    }
                }
                continue;
            }
            // a quote opens a quoted section only at the start of a field
            if byte == b'"' && field_start {
                in_quotes = true;
                field_start = false;
                continue;
            }
            field_start = match CANDIDATES.iter().position(|d| d.as_byte() == byte) {
                Some(idx) => {
                    counts[idx] += 1;
                    true
                }
                None => false,
            };
        }

        // max_by_key returns the last maximum, so walk candidates in reverse
        // to let the first one (comma) win ties
        let (idx, count) = counts
            .iter()
            .enumerate()
            .rev()
            .max_by_key(|(_, count)| **count)
            .map(|(idx, count)| (idx, *count))
            .unwrap_or((0, 0));

        if count == 0 {
            return Err(ExcelError::Detection(
                "no comma or semicolon in sample".to_string(),
            ));
        }

        Ok(CANDIDATES[idx])
    }

    /// Read the first non-blank line of `path` (bounded to the sample
    /// budget) and detect
    pub fn detect_file<P: AsRef<Path>>(&self, path: P) -> Result<Delimiter> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            ExcelError::MalformedFile(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let mut reader = BufReader::new(file).take(self.sample_bytes as u64);
        let mut sample = Vec::with_capacity(self.sample_bytes.min(8192));
        let mut first = true;
        loop {
            sample.clear();
            let read = reader.read_until(b'\n', &mut sample).map_err(|e| {
                ExcelError::MalformedFile(format!("Failed to read {}: {}", path.display(), e))
            })?;
            if read == 0 {
                break;
            }

            while matches!(sample.last(), Some(b'\n' | b'\r')) {
                sample.pop();
            }
            // UTF-8 byte order mark
            if first && sample.starts_with(b"\xEF\xBB\xBF") {
                sample.drain(..3);
            }
            first = false;

            if !sample.is_empty() {
                break;
            }
        }

        self.detect(&sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_comma_only() {
        let detector = DelimiterDetector::default();
        assert_eq!(detector.detect(b"id,name,city").unwrap(), Delimiter::Comma);
    }

    #[test]
    fn test_semicolon_only() {
        let detector = DelimiterDetector::default();
        assert_eq!(
            detector.detect(b"id;name;city").unwrap(),
            Delimiter::Semicolon
        );
    }

    #[test]
    fn test_majority_wins() {
        let detector = DelimiterDetector::default();
        assert_eq!(
            detector.detect(b"price;amount;note,with comma").unwrap(),
            Delimiter::Semicolon
        );
    }

    #[test]
    fn test_tie_prefers_comma() {
        let detector = DelimiterDetector::default();
        assert_eq!(detector.detect(b"a;b,c").unwrap(), Delimiter::Comma);
    }

    #[test]
    fn test_quoted_candidates_ignored() {
        let detector = DelimiterDetector::default();
        assert_eq!(
            detector.detect(br#""a,b,c";d;e"#).unwrap(),
            Delimiter::Semicolon
        );
    }

    #[test]
    fn test_empty_sample_fails() {
        let detector = DelimiterDetector::default();
        assert!(matches!(
            detector.detect(b""),
            Err(ExcelError::Detection(_))
        ));
    }

    #[test]
    fn test_no_candidate_fails() {
        let detector = DelimiterDetector::default();
        assert!(matches!(
            detector.detect(b"single column header"),
            Err(ExcelError::Detection(_))
        ));
    }

    #[test]
    fn test_detect_file_reads_first_line_only() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a;b;c").unwrap();
        writeln!(file, "1,2,3,4,5,6").unwrap();
        let detector = DelimiterDetector::default();
        assert_eq!(
            detector.detect_file(file.path()).unwrap(),
            Delimiter::Semicolon
        );
    }

    #[test]
    fn test_stray_quote_in_unquoted_field() {
        let detector = DelimiterDetector::default();
        // the inch mark must not hide the semicolons that follow it
        assert_eq!(
            detector.detect(br#"a,5" tv;b;c"#).unwrap(),
            Delimiter::Semicolon
        );
        assert_eq!(
            detector.detect(br#""x;y";"say ""hi"", ok";z,1"#).unwrap(),
            Delimiter::Semicolon
        );
    }

    #[test]
    fn test_detect_file_skips_leading_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "\r\n\nid;name\n1;x\n").unwrap();
        let detector = DelimiterDetector::default();
        assert_eq!(
            detector.detect_file(file.path()).unwrap(),
            Delimiter::Semicolon
        );
    }

    #[test]
    fn test_detect_file_empty() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let detector = DelimiterDetector::default();
        assert!(matches!(
            detector.detect_file(file.path()),
            Err(ExcelError::Detection(_))
        ));
    }
}
