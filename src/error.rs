//! Error types for conversion jobs

use thiserror::Error;

/// Result type alias for excelerate operations
pub type Result<T> = std::result::Result<T, ExcelError>;

/// Main error type
///
/// The first four variants are the conversion taxonomy every job failure is
/// classified into. The rest are plumbing errors raised by the reader, the
/// workbook writer and configuration loading; [`ExcelError::kind`] maps them
/// onto the taxonomy.
#[derive(Error, Debug)]
pub enum ExcelError {
    /// Column separator could not be determined from the file's leading sample
    #[error("Delimiter detection failed: {0}")]
    Detection(String),

    /// Source file is unreadable or structurally invalid
    #[error("Malformed file: {0}")]
    MalformedFile(String),

    /// Not enough memory to materialize a chunk
    #[error("Memory exhausted: {0}")]
    MemoryExhausted(String),

    /// Output workbook could not be created or finalized
    #[error("Output write failed: {0}")]
    IoWrite(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Read error: {0}")]
    ReadError(String),

    #[error("Write error: {0}")]
    WriteError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Job was never started because the batch was asked to stop
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

/// Classification of an error at the per-job boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Detection,
    MalformedFile,
    MemoryExhausted,
    IoWrite,
    Cancelled,
    Other,
}

impl ExcelError {
    /// Map this error onto the conversion taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExcelError::Detection(_) => ErrorKind::Detection,
            ExcelError::MalformedFile(_) | ExcelError::ReadError(_) => ErrorKind::MalformedFile,
            ExcelError::MemoryExhausted(_) => ErrorKind::MemoryExhausted,
            ExcelError::IoWrite(_)
            | ExcelError::WriteError(_)
            | ExcelError::Io(_)
            | ExcelError::Zip(_) => ErrorKind::IoWrite,
            ExcelError::Cancelled(_) => ErrorKind::Cancelled,
            ExcelError::Config(_) => ErrorKind::Other,
        }
    }

    /// Only memory pressure is worth another attempt with a smaller chunk
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExcelError::MemoryExhausted(_))
    }

    /// Reclassify a writer-side failure as [`ExcelError::IoWrite`]
    pub(crate) fn into_write_error(self) -> ExcelError {
        match self {
            ExcelError::Io(e) => ExcelError::IoWrite(e.to_string()),
            ExcelError::Zip(e) => ExcelError::IoWrite(e.to_string()),
            ExcelError::WriteError(msg) => ExcelError::IoWrite(msg),
            other => other,
        }
    }
}
