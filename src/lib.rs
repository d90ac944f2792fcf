//! # excelerate
//!
//! Bulk conversion of delimited text files into Excel workbooks.
//!
//! Each file is read in row chunks sized from its length and the free
//! memory, streamed into a single-sheet XLSX, and retried with smaller
//! chunks when memory runs short. Files are converted in parallel on a
//! bounded worker pool and every outcome is appended to an audit log.
//!
//! ## Converting a directory
//!
//! ```no_run
//! use excelerate::{find_input_files, AuditLog, Config, JobScheduler, SystemMemory};
//! use std::sync::Arc;
//!
//! # fn main() -> excelerate::Result<()> {
//! let config = Config::load(std::path::Path::new("data"))?;
//! let files = find_input_files(&config)?;
//!
//! std::fs::create_dir_all(config.output_dir())?;
//! let audit = AuditLog::open_in(&config.output_dir())?;
//! let scheduler = JobScheduler::new(config, Arc::new(SystemMemory::new()))?;
//! for outcome in scheduler.run(&files, &audit)? {
//!     println!("{}: {}", outcome.file_name(), outcome.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Converting one file
//!
//! ```no_run
//! use excelerate::{ChunkSize, ChunkSizer, ChunkedConverter, ChunkConfig, ConversionJob, FixedMemory};
//! use std::sync::Arc;
//!
//! # fn main() -> excelerate::Result<()> {
//! let converter = ChunkedConverter::new(
//!     ChunkSizer::new(&ChunkConfig::default()),
//!     Arc::new(FixedMemory(1 << 30)),
//! );
//! let mut job = ConversionJob::new("sales.csv", "sales.xlsx", ChunkSize::new(10_000));
//! let report = converter.convert(&mut job)?;
//! println!("{} rows, {} skipped", report.rows_written, report.rows_skipped);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod cli;
pub mod config;
pub mod converter;
pub mod csv;
pub mod csv_reader;
pub mod error;
pub mod fast_writer;
pub mod logger;
pub mod memory;
pub mod progress;
pub mod retry;
pub mod scan;
pub mod scheduler;
pub mod sizing;
pub mod streaming_reader;
pub mod types;

pub use audit::{AuditLog, BatchSummary, LogSink, OutcomeSink, AUDIT_FILE_NAME};
pub use config::{ChunkConfig, Config};
pub use converter::ChunkedConverter;
pub use csv::{Delimiter, DelimiterDetector};
pub use csv_reader::{CsvReader, CsvRecord};
pub use error::{ErrorKind, ExcelError, Result};
pub use memory::{FixedMemory, MemoryProbe, ScriptedMemory, SystemMemory};
pub use retry::{RetryController, RetryRun, RetryState};
pub use scan::{find_input_files, target_path_for};
pub use scheduler::{FileConverter, JobScheduler};
pub use sizing::{ChunkSize, ChunkSizer};
pub use streaming_reader::SheetReader;
pub use types::{ConversionJob, ConversionOutcome, ConversionReport, FailureDetail, OutcomeStatus};
