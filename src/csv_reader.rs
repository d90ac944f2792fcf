//! CSV file reading in bounded chunks

use crate::csv::{CsvParser, Delimiter};
use crate::error::{ExcelError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One data record together with the physical line it started on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRecord {
    /// 1-based line number of the record's first line
    pub line: u64,
    pub fields: Vec<String>,
}

/// CSV file reader that hands out rows chunk by chunk
///
/// Blank lines are skipped. Quoted fields may contain line breaks; such a
/// record is assembled from as many physical lines as needed. Memory usage
/// is bounded by the largest chunk the caller asks for.
///
/// # Examples
///
/// ```no_run
/// use excelerate::csv_reader::CsvReader;
/// use excelerate::csv::Delimiter;
///
/// let mut reader = CsvReader::open("data.csv")?.delimiter(Delimiter::Semicolon);
/// let header = reader.read_header()?.to_vec();
/// let mut chunk = Vec::new();
/// while reader.next_chunk(1000, &mut chunk)? > 0 {
///     for record in &chunk {
///         assert_eq!(record.fields.len(), header.len());
///     }
/// }
/// # Ok::<(), excelerate::ExcelError>(())
/// ```
pub struct CsvReader {
    reader: BufReader<File>,
    path: PathBuf,
    parser: CsvParser,

    line_buffer: String,
    record_buffer: String,
    line_number: u64,

    headers: Option<Vec<String>>,
    record_count: u64,
}

impl CsvReader {
    /// Open a CSV file, comma-delimited until told otherwise
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            ExcelError::MalformedFile(format!("Failed to open {}: {}", path.display(), e))
        })?;

        Ok(CsvReader {
            reader: BufReader::with_capacity(64 * 1024, file),
            path: path.to_path_buf(),
            parser: CsvParser::default(),
            line_buffer: String::with_capacity(1024),
            record_buffer: String::with_capacity(1024),
            line_number: 0,
            headers: None,
            record_count: 0,
        })
    }

    /// Set the delimiter (builder pattern)
    pub fn delimiter(mut self, delimiter: Delimiter) -> Self {
        self.parser = CsvParser::new(delimiter.as_byte(), b'"');
        self
    }

    /// Read and store the header row
    ///
    /// Must be called before any data row is read. Fails with
    /// [`ExcelError::MalformedFile`] if the file has no header or the header
    /// has no named column.
    pub fn read_header(&mut self) -> Result<&[String]> {
        if self.headers.is_none() {
            let mut fields = match self.read_raw_record()? {
                Some((_, fields)) => fields,
                None => {
                    return Err(ExcelError::MalformedFile(format!(
                        "{} is empty",
                        self.path.display()
                    )))
                }
            };

            if let Some(first) = fields.first_mut() {
                if let Some(stripped) = first.strip_prefix('\u{feff}') {
                    *first = stripped.to_string();
                }
            }

            if fields.iter().all(|f| f.trim().is_empty()) {
                return Err(ExcelError::MalformedFile(format!(
                    "{} has no columns",
                    self.path.display()
                )));
            }
            self.headers = Some(fields);
        }

        Ok(self.headers.as_deref().unwrap_or_default())
    }

    /// Header row, if it has been read
    pub fn headers(&self) -> Option<&[String]> {
        self.headers.as_deref()
    }

    /// Read the next data record; `Ok(None)` at end of file
    pub fn read_record(&mut self) -> Result<Option<CsvRecord>> {
        if self.headers.is_none() {
            self.read_header()?;
        }

        Ok(self.read_raw_record()?.map(|(line, fields)| {
            self.record_count += 1;
            CsvRecord { line, fields }
        }))
    }

    /// Fill `chunk` with up to `max_rows` records, replacing its contents
    ///
    /// Returns the number of records read; 0 means end of file. The caller
    /// owns the buffer so its allocation can be reused between chunks.
    pub fn next_chunk(&mut self, max_rows: usize, chunk: &mut Vec<CsvRecord>) -> Result<usize> {
        chunk.clear();
        while chunk.len() < max_rows {
            match self.read_record()? {
                Some(record) => chunk.push(record),
                None => break,
            }
        }
        Ok(chunk.len())
    }

    /// Iterator over the remaining data records
    pub fn records(&mut self) -> CsvRecordIterator<'_> {
        CsvRecordIterator { reader: self }
    }

    /// Number of data records read so far (header excluded)
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    fn read_line(&mut self) -> Result<usize> {
        self.line_buffer.clear();
        let bytes = self.reader.read_line(&mut self.line_buffer).map_err(|e| {
            ExcelError::MalformedFile(format!(
                "Failed to read {} at line {}: {}",
                self.path.display(),
                self.line_number + 1,
                e
            ))
        })?;
        if bytes > 0 {
            self.line_number += 1;
        }
        Ok(bytes)
    }

    /// Next non-blank record as (starting line, fields)
    fn read_raw_record(&mut self) -> Result<Option<(u64, Vec<String>)>> {
        loop {
            if self.read_line()? == 0 {
                return Ok(None);
            }
            trim_line_ending(&mut self.line_buffer);
            if self.line_buffer.is_empty() {
                continue;
            }

            let start_line = self.line_number;
            self.record_buffer.clear();
            self.record_buffer.push_str(&self.line_buffer);

            while !self.parser.is_record_complete(&self.record_buffer) {
                if self.read_line()? == 0 {
                    return Err(ExcelError::MalformedFile(format!(
                        "{}: unterminated quoted field starting at line {}",
                        self.path.display(),
                        start_line
                    )));
                }
                trim_line_ending(&mut self.line_buffer);
                self.record_buffer.push('\n');
                self.record_buffer.push_str(&self.line_buffer);
            }

            return Ok(Some((start_line, self.parser.parse_record(&self.record_buffer))));
        }
    }
}

fn trim_line_ending(line: &mut String) {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
}

/// Iterator over CSV data records
pub struct CsvRecordIterator<'a> {
    reader: &'a mut CsvReader,
}

impl Iterator for CsvRecordIterator<'_> {
    type Item = Result<CsvRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_record().transpose()
    }
}
