//! Job and outcome records passed between the scheduler, retry controller and audit log

use crate::csv::Delimiter;
use crate::error::{ErrorKind, ExcelError};
use crate::sizing::ChunkSize;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One file to convert, owned by the worker running it
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    /// `None` until detected on the first attempt
    pub delimiter: Option<Delimiter>,
    pub chunk_size: ChunkSize,
    /// Retries performed so far
    pub attempt_count: u32,
}

impl ConversionJob {
    pub fn new<S: Into<PathBuf>, T: Into<PathBuf>>(
        source_path: S,
        target_path: T,
        chunk_size: ChunkSize,
    ) -> Self {
        ConversionJob {
            source_path: source_path.into(),
            target_path: target_path.into(),
            delimiter: None,
            chunk_size,
            attempt_count: 0,
        }
    }

    /// Skip detection and use `delimiter` (builder pattern)
    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Source file name for logs and reports
    pub fn file_name(&self) -> String {
        display_name(&self.source_path)
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// What a successful conversion produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionReport {
    /// Data rows written (header excluded)
    pub rows_written: u64,
    /// Rows dropped for having the wrong column count
    pub rows_skipped: u64,
    /// Chunks read, including the final partial one
    pub chunks: u64,
    pub columns: usize,
}

/// Terminal status of one job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Success => write!(f, "success"),
            OutcomeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Why a job failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ExcelError> for FailureDetail {
    fn from(err: &ExcelError) -> Self {
        FailureDetail {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Terminal record of one file's conversion, produced exactly once per job
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutcome {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub status: OutcomeStatus,
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
    pub attempts: u32,
    pub chunk_size: ChunkSize,
    pub rows_written: u64,
    pub rows_skipped: u64,
    pub error: Option<FailureDetail>,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl ConversionOutcome {
    pub fn success(job: &ConversionJob, report: &ConversionReport, duration: Duration) -> Self {
        ConversionOutcome {
            source_path: job.source_path.clone(),
            target_path: job.target_path.clone(),
            status: OutcomeStatus::Success,
            duration,
            attempts: job.attempt_count,
            chunk_size: job.chunk_size,
            rows_written: report.rows_written,
            rows_skipped: report.rows_skipped,
            error: None,
        }
    }

    pub fn failure(job: &ConversionJob, err: &ExcelError, duration: Duration) -> Self {
        ConversionOutcome {
            source_path: job.source_path.clone(),
            target_path: job.target_path.clone(),
            status: OutcomeStatus::Failed,
            duration,
            attempts: job.attempt_count,
            chunk_size: job.chunk_size,
            rows_written: 0,
            rows_skipped: 0,
            error: Some(FailureDetail::from(err)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    pub fn file_name(&self) -> String {
        display_name(&self.source_path)
    }
}
