//! Chunked CSV to XLSX conversion of a single file

use crate::csv::{Delimiter, DelimiterDetector};
use crate::csv_reader::{CsvReader, CsvRecord};
use crate::error::{ExcelError, Result};
use crate::fast_writer::{strip_invalid_xml, WorkbookWriter};
use crate::memory::MemoryProbe;
use crate::sizing::{ChunkSize, ChunkSizer};
use crate::streaming_reader::SheetReader;
use crate::types::{ConversionJob, ConversionReport};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Skipped rows logged individually at warn level; the rest go to debug
const SKIP_WARN_LIMIT: u64 = 20;

/// Cell values normalized to empty cells
const NULL_MARKERS: [&str; 2] = ["nan", "NAN"];

/// Converts one CSV file into a single-sheet workbook, chunk by chunk
///
/// Before each chunk is read, its estimated footprint is checked against
/// the memory probe and the row buffer is reserved fallibly. Either failing
/// yields [`ExcelError::MemoryExhausted`], which the retry controller answers
/// with a smaller chunk. Chunking never changes what is written: the output
/// holds the header followed by every well-formed row in file order.
pub struct ChunkedConverter {
    sizer: ChunkSizer,
    memory: Arc<dyn MemoryProbe>,
    detector: DelimiterDetector,
    verify_output: bool,
}

impl ChunkedConverter {
    pub fn new(sizer: ChunkSizer, memory: Arc<dyn MemoryProbe>) -> Self {
        ChunkedConverter {
            sizer,
            memory,
            detector: DelimiterDetector::default(),
            verify_output: false,
        }
    }

    /// Re-read each finished workbook and check its row count (builder pattern)
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify_output = verify;
        self
    }

    pub fn with_detector(mut self, detector: DelimiterDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn sizer(&self) -> &ChunkSizer {
        &self.sizer
    }

    /// Starting chunk size for `path` from its size and current free memory
    pub fn initial_chunk_size(&self, path: &Path) -> ChunkSize {
        let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        self.sizer
            .initial(file_size, self.memory.available_memory_bytes())
    }

    /// Convert `job.source_path` into `job.target_path`
    ///
    /// Resolves and stores the delimiter on the job if it is not set yet.
    /// On failure the partially written workbook is removed.
    pub fn convert(&self, job: &mut ConversionJob) -> Result<ConversionReport> {
        let delimiter = self.resolve_delimiter(job)?;

        let mut reader = CsvReader::open(&job.source_path)?.delimiter(delimiter);
        let mut header = reader.read_header()?.to_vec();
        let mut altered = 0u64;
        for value in header.iter_mut() {
            if strip_invalid_xml(value) {
                altered += 1;
            }
        }
        if altered > 0 {
            warn!(
                "{}: removed characters not allowed in XML from the header",
                job.file_name()
            );
        }

        let mut output = PartialOutput::new(&job.target_path);
        let mut workbook = WorkbookWriter::create(&job.target_path, &sheet_name(job))
            .map_err(ExcelError::into_write_error)?;

        let report = self.stream_rows(&mut reader, &mut workbook, &header, job, &mut altered)?;
        if altered > 0 {
            debug!(
                "{}: {} values lost characters not allowed in XML",
                job.file_name(),
                altered
            );
        }
        workbook.close().map_err(ExcelError::into_write_error)?;

        if self.verify_output {
            verify_row_count(&job.target_path, report.rows_written + 1)?;
        }

        output.keep();
        Ok(report)
    }

    fn resolve_delimiter(&self, job: &mut ConversionJob) -> Result<Delimiter> {
        if let Some(delimiter) = job.delimiter {
            return Ok(delimiter);
        }
        let delimiter = self.detector.detect_file(&job.source_path)?;
        debug!(
            "{}: detected delimiter '{}'",
            job.file_name(),
            delimiter.as_char()
        );
        job.delimiter = Some(delimiter);
        Ok(delimiter)
    }

    fn stream_rows(
        &self,
        reader: &mut CsvReader,
        workbook: &mut WorkbookWriter,
        header: &[String],
        job: &ConversionJob,
        altered: &mut u64,
    ) -> Result<ConversionReport> {
        let name = job.file_name();
        let mut report = ConversionReport {
            columns: header.len(),
            ..ConversionReport::default()
        };

        workbook
            .write_header(header)
            .map_err(ExcelError::into_write_error)?;

        let mut chunk: Vec<CsvRecord> = Vec::new();
        loop {
            self.reserve_chunk(&mut chunk, job.chunk_size)?;
            let rows = reader.next_chunk(job.chunk_size.rows(), &mut chunk)?;
            if rows == 0 {
                break;
            }
            report.chunks += 1;
            debug!("{}: chunk {} with {} rows", name, report.chunks, rows);

            for mut record in chunk.drain(..) {
                if record.fields.len() != report.columns {
                    report.rows_skipped += 1;
                    if report.rows_skipped <= SKIP_WARN_LIMIT {
                        warn!(
                            "{}: skipping line {}: expected {} columns, found {}",
                            name,
                            record.line,
                            report.columns,
                            record.fields.len()
                        );
                    } else {
                        debug!("{}: skipping line {}", name, record.line);
                    }
                    continue;
                }

                for value in record.fields.iter_mut() {
                    if NULL_MARKERS.contains(&value.as_str()) {
                        value.clear();
                    } else if strip_invalid_xml(value) {
                        *altered += 1;
                        if *altered == 1 {
                            warn!(
                                "{}: removed characters not allowed in XML from line {} (further values logged at debug)",
                                name, record.line
                            );
                        }
                    }
                }
                workbook
                    .write_row(&record.fields)
                    .map_err(ExcelError::into_write_error)?;
                report.rows_written += 1;
            }
        }

        if report.rows_skipped > SKIP_WARN_LIMIT {
            warn!(
                "{}: {} rows skipped for wrong column count",
                name, report.rows_skipped
            );
        }

        if report.rows_written == 0 {
            return Err(ExcelError::MalformedFile(format!(
                "{} has no valid data rows ({} skipped)",
                name, report.rows_skipped
            )));
        }

        Ok(report)
    }

    /// Make room for a chunk of `size` rows or report memory exhaustion
    fn reserve_chunk(&self, chunk: &mut Vec<CsvRecord>, size: ChunkSize) -> Result<()> {
        let needed = self.sizer.footprint(size);
        let available = self.memory.available_memory_bytes();
        if needed > available {
            return Err(ExcelError::MemoryExhausted(format!(
                "chunk of {} needs ~{} bytes, {} available",
                size, needed, available
            )));
        }

        chunk.clear();
        chunk.try_reserve(size.rows()).map_err(|e| {
            ExcelError::MemoryExhausted(format!("cannot allocate chunk of {}: {}", size, e))
        })
    }
}

fn sheet_name(job: &ConversionJob) -> String {
    job.source_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn verify_row_count(path: &Path, expected: u64) -> Result<()> {
    let found = SheetReader::open(path)
        .and_then(|mut reader| reader.row_count())
        .map_err(|e| ExcelError::IoWrite(format!("verification failed: {}", e)))?;
    if found as u64 != expected {
        return Err(ExcelError::IoWrite(format!(
            "verification failed: {} holds {} rows, expected {}",
            path.display(),
            found,
            expected
        )));
    }
    Ok(())
}

/// Removes the output file on drop unless the conversion completed
struct PartialOutput {
    path: PathBuf,
    keep: bool,
}

impl PartialOutput {
    fn new(path: &Path) -> Self {
        PartialOutput {
            path: path.to_path_buf(),
            keep: false,
        }
    }

    fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("removed partial output {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("could not remove {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkConfig;
    use crate::memory::{FixedMemory, ScriptedMemory};
    use tempfile::TempDir;

    fn converter(memory: Arc<dyn MemoryProbe>) -> ChunkedConverter {
        let sizer = ChunkSizer::new(&ChunkConfig {
            min_rows: 1,
            max_rows: 10_000,
            shrink_divisor: 2,
            row_footprint_bytes: 100,
            memory_share: 0.5,
        });
        ChunkedConverter::new(sizer, memory)
    }

    fn job_for(dir: &TempDir, name: &str, content: &str, chunk: usize) -> ConversionJob {
        let source = dir.path().join(name);
        std::fs::write(&source, content).unwrap();
        let target = dir.path().join(format!("{}.xlsx", name));
        ConversionJob::new(source, target, ChunkSize::new(chunk))
    }

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        SheetReader::open(path).unwrap().rows().unwrap()
    }

    #[test]
    fn test_ten_rows_in_chunks_of_three() {
        let dir = TempDir::new().unwrap();
        let mut content = String::from("id,name,score\n");
        for i in 1..=10 {
            content.push_str(&format!("{},user{},{}\n", i, i, i * 10));
        }
        let mut job = job_for(&dir, "ten.csv", &content, 3);

        let report = converter(Arc::new(FixedMemory(u64::MAX)))
            .with_verification(true)
            .convert(&mut job)
            .unwrap();

        assert_eq!(report.rows_written, 10);
        assert_eq!(report.chunks, 4);
        assert_eq!(job.delimiter, Some(Delimiter::Comma));

        let rows = read_rows(&job.target_path);
        assert_eq!(rows.len(), 11);
        assert_eq!(rows[0], vec!["id", "name", "score"]);
        for (i, row) in rows[1..].iter().enumerate() {
            assert_eq!(row[0], (i + 1).to_string());
        }
    }

    #[test]
    fn test_chunk_size_does_not_change_output() {
        let dir = TempDir::new().unwrap();
        let mut content = String::from("a;b\n");
        for i in 0..37 {
            content.push_str(&format!("{};\"v;{}\"\n", i, i));
        }

        let mut outputs = Vec::new();
        for chunk in [1, 2, 5, 36, 37, 1000] {
            let mut job = job_for(&dir, &format!("c{}.csv", chunk), &content, chunk);
            converter(Arc::new(FixedMemory(u64::MAX)))
                .convert(&mut job)
                .unwrap();
            outputs.push(read_rows(&job.target_path));
        }

        assert_eq!(outputs[0].len(), 38);
        assert_eq!(outputs[0][5], vec!["4", "v;4"]);
        assert!(outputs.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_wrong_column_count_row_skipped() {
        let dir = TempDir::new().unwrap();
        let mut job = job_for(&dir, "skip.csv", "a,b,c\n1,2,3\n4,5\n7,,9\n", 2);

        let report = converter(Arc::new(FixedMemory(u64::MAX)))
            .convert(&mut job)
            .unwrap();

        assert_eq!(report.rows_written, 2);
        assert_eq!(report.rows_skipped, 1);
        let rows = read_rows(&job.target_path);
        assert_eq!(rows[1], vec!["1", "2", "3"]);
        assert_eq!(rows[2], vec!["7", "", "9"]);
    }

    #[test]
    fn test_no_valid_rows_is_malformed() {
        let dir = TempDir::new().unwrap();
        let mut job = job_for(&dir, "bad.csv", "a,b,c\n1,2\n3\n", 10);

        let err = converter(Arc::new(FixedMemory(u64::MAX)))
            .convert(&mut job)
            .unwrap_err();

        assert!(matches!(err, ExcelError::MalformedFile(_)));
        assert!(!job.target_path.exists());
    }

    #[test]
    fn test_header_only_is_malformed() {
        let dir = TempDir::new().unwrap();
        let mut job = job_for(&dir, "header.csv", "a,b\n", 10);
        let err = converter(Arc::new(FixedMemory(u64::MAX)))
            .convert(&mut job)
            .unwrap_err();
        assert!(matches!(err, ExcelError::MalformedFile(_)));
    }

    #[test]
    fn test_undetectable_delimiter() {
        let dir = TempDir::new().unwrap();
        let mut job = job_for(&dir, "one.csv", "single\nvalue\n", 10);
        let err = converter(Arc::new(FixedMemory(u64::MAX)))
            .convert(&mut job)
            .unwrap_err();
        assert!(matches!(err, ExcelError::Detection(_)));
        assert!(job.delimiter.is_none());
    }

    #[test]
    fn test_preset_delimiter_skips_detection() {
        let dir = TempDir::new().unwrap();
        let mut job = job_for(&dir, "preset.csv", "single\nvalue\n", 10)
            .with_delimiter(Delimiter::Semicolon);
        let report = converter(Arc::new(FixedMemory(u64::MAX)))
            .convert(&mut job)
            .unwrap();
        assert_eq!(report.rows_written, 1);
        assert_eq!(report.columns, 1);
    }

    #[test]
    fn test_memory_shortfall_removes_output() {
        let dir = TempDir::new().unwrap();
        let mut job = job_for(&dir, "mem.csv", "a,b\n1,2\n3,4\n5,6\n", 1);
        // first chunk fits, the second does not
        let probe = Arc::new(ScriptedMemory::new(vec![u64::MAX, 0]));

        let err = converter(probe).convert(&mut job).unwrap_err();

        assert!(err.is_retryable());
        assert!(!job.target_path.exists());
    }

    #[test]
    fn test_nan_markers_become_empty() {
        let dir = TempDir::new().unwrap();
        let mut job = job_for(&dir, "nan.csv", "a,b\nnan,1\nNAN,NaN\n", 10);
        converter(Arc::new(FixedMemory(u64::MAX)))
            .convert(&mut job)
            .unwrap();
        let rows = read_rows(&job.target_path);
        assert_eq!(rows[1], vec!["", "1"]);
        assert_eq!(rows[2], vec!["", "NaN"]);
    }

    #[test]
    fn test_characters_invalid_in_xml_removed() {
        let dir = TempDir::new().unwrap();
        let content = "id\u{FFFE},note\n1,bell\u{7}\n2,end\u{FFFF}mark\n3,ok \u{E9}\n";
        let mut job = job_for(&dir, "ctrl.csv", content, 10);
        let report = converter(Arc::new(FixedMemory(u64::MAX)))
            .convert(&mut job)
            .unwrap();

        assert_eq!(report.rows_written, 3);
        assert_eq!(
            read_rows(&job.target_path),
            vec![
                vec!["id", "note"],
                vec!["1", "bell"],
                vec!["2", "endmark"],
                vec!["3", "ok \u{E9}"],
            ]
        );
    }

    #[test]
    fn test_unwritable_target_is_io_write() {
        let dir = TempDir::new().unwrap();
        let mut job = job_for(&dir, "ok.csv", "a,b\n1,2\n", 10);
        job.target_path = dir.path().join("missing_dir").join("ok.xlsx");
        let err = converter(Arc::new(FixedMemory(u64::MAX)))
            .convert(&mut job)
            .unwrap_err();
        assert!(matches!(err, ExcelError::IoWrite(_)));
    }

    #[test]
    fn test_stray_inch_marks_keep_rows_apart() {
        let dir = TempDir::new().unwrap();
        let mut job = job_for(
            &dir,
            "tv.csv",
            "a,b,c\n1,5\" tv,3\n2,x,4\n3,7\" tv,5\n4,y,6\n",
            2,
        );

        let report = converter(Arc::new(FixedMemory(u64::MAX)))
            .convert(&mut job)
            .unwrap();

        assert_eq!(report.rows_written, 4);
        assert_eq!(report.rows_skipped, 0);
        assert_eq!(
            read_rows(&job.target_path),
            vec![
                vec!["a", "b", "c"],
                vec!["1", "5\" tv", "3"],
                vec!["2", "x", "4"],
                vec!["3", "7\" tv", "5"],
                vec!["4", "y", "6"],
            ]
        );
    }

    #[test]
    fn test_retry_shrinks_until_chunk_fits() {
        use crate::retry::{RetryController, RetryState};

        let dir = TempDir::new().unwrap();
        let mut content = String::from("k,v\n");
        for i in 0..20 {
            content.push_str(&format!("{},{}\n", i, i * 2));
        }
        let mut job = job_for(&dir, "shrink.csv", &content, 8);

        // 100 bytes per row: 8 rows need 800, 4 rows need 400
        let converter = converter(Arc::new(FixedMemory(500)));
        let retry = RetryController::new(converter.sizer().clone(), 3);
        let run = retry.run(&mut job, |job| converter.convert(job));

        assert_eq!(run.state(), RetryState::Succeeded);
        assert_eq!(job.attempt_count, 1);
        assert_eq!(job.chunk_size, ChunkSize::new(4));
        assert_eq!(run.result.unwrap().rows_written, 20);
        assert_eq!(read_rows(&job.target_path).len(), 21);
    }
}
