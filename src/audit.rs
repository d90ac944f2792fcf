//! Per-file outcome recording and batch summaries

use crate::error::Result;
use crate::types::ConversionOutcome;
use log::{error, info, warn};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Audit file written into the output directory
pub const AUDIT_FILE_NAME: &str = "conversion_audit.jsonl";

/// Receives each job's outcome as soon as the job finishes
///
/// Called concurrently from worker threads.
pub trait OutcomeSink: Send + Sync {
    fn record(&self, outcome: &ConversionOutcome);
}

/// Sink that only logs
#[derive(Debug, Default)]
pub struct LogSink;

impl OutcomeSink for LogSink {
    fn record(&self, outcome: &ConversionOutcome) {
        log_outcome(outcome);
    }
}

fn log_outcome(outcome: &ConversionOutcome) {
    match &outcome.error {
        None => info!(
            "{}: converted {} rows to {} in {:.2}s",
            outcome.file_name(),
            outcome.rows_written,
            outcome.target_path.display(),
            outcome.duration.as_secs_f64()
        ),
        Some(detail) => error!(
            "{}: failed after {:.2}s: {}",
            outcome.file_name(),
            outcome.duration.as_secs_f64(),
            detail.message
        ),
    }
}

#[derive(Serialize)]
struct AuditRecord<'a> {
    timestamp: String,
    filename: String,
    #[serde(flatten)]
    outcome: &'a ConversionOutcome,
}

/// Appends one JSON line per outcome to a shared file
///
/// Each line is serialized up front and written with a single `write_all`
/// under the lock, so concurrent workers never interleave partial records.
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AuditLog {
    /// Open (or create) `<dir>/conversion_audit.jsonl` for appending
    pub fn open_in(dir: &Path) -> Result<Self> {
        Self::open(dir.join(AUDIT_FILE_NAME))
    }

    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(AuditLog {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, outcome: &ConversionOutcome) -> Result<()> {
        let record = AuditRecord {
            timestamp: chrono::Local::now().to_rfc3339(),
            filename: outcome.file_name(),
            outcome,
        };
        let mut line = serde_json::to_vec(&record)
            .map_err(|e| crate::error::ExcelError::WriteError(e.to_string()))?;
        line.push(b'\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| crate::error::ExcelError::WriteError("audit log lock poisoned".into()))?;
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

impl OutcomeSink for AuditLog {
    fn record(&self, outcome: &ConversionOutcome) {
        log_outcome(outcome);
        if let Err(e) = self.append(outcome) {
            warn!("could not append to {}: {}", self.path.display(), e);
        }
    }
}

/// Totals for a finished batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub total_files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rows_written: u64,
    pub rows_skipped: u64,
    pub total_time: Duration,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[ConversionOutcome]) -> Self {
        let mut summary = BatchSummary {
            total_files: outcomes.len(),
            ..BatchSummary::default()
        };
        for outcome in outcomes {
            if outcome.is_success() {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            summary.rows_written += outcome.rows_written;
            summary.rows_skipped += outcome.rows_skipped;
            summary.total_time += outcome.duration;
        }
        summary
    }

    /// Every file failed (an empty batch is not a failure)
    pub fn all_failed(&self) -> bool {
        self.total_files > 0 && self.succeeded == 0
    }
}
