//! Batch configuration: defaults, `excelerate.toml` loading and validation

use crate::error::{ExcelError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name of the optional config file looked up in the base directory
pub const CONFIG_FILE_NAME: &str = "excelerate.toml";

/// Output folder created under the base directory when none is configured
pub const DEFAULT_OUTPUT_DIR_NAME: &str = "ExcelerateCSV";

/// Chunk sizing bounds and tuning
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChunkConfig {
    /// Floor: chunks never shrink below this many rows
    pub min_rows: usize,
    /// Cap for the initial chunk
    pub max_rows: usize,
    /// Each retry divides the chunk size by this
    pub shrink_divisor: usize,
    /// Assumed memory cost of one materialized row
    pub row_footprint_bytes: u64,
    /// Fraction of available memory one chunk may use
    pub memory_share: f64,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        ChunkConfig {
            min_rows: 500,
            max_rows: 1_000_000,
            shrink_divisor: 2,
            row_footprint_bytes: 4096,
            memory_share: 1.0 / 15.0,
        }
    }
}

/// Immutable settings for one batch run
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory scanned (recursively) for input files
    pub base_dir: PathBuf,
    /// Where workbooks and the audit log go; `<base_dir>/ExcelerateCSV` if unset
    pub output_dir: Option<PathBuf>,
    /// Only files whose name starts with this are converted
    pub file_prefix: String,
    /// Case-insensitive extension filter, without the dot
    pub extension: String,
    /// Worker cap; `None` uses every available core
    pub max_workers: Option<usize>,
    /// Retries allowed after a memory failure
    pub max_retries: u32,
    /// Append `_YYYYMMDDHHMMSS` to output file names
    pub timestamp_suffix: bool,
    /// Re-read each workbook after writing and check its row count
    pub verify_output: bool,
    pub chunk: ChunkConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_dir: PathBuf::from("."),
            output_dir: None,
            file_prefix: String::new(),
            extension: "csv".to_string(),
            max_workers: None,
            max_retries: 3,
            timestamp_suffix: true,
            verify_output: false,
            chunk: ChunkConfig::default(),
        }
    }
}

impl Config {
    /// Defaults rooted at `base_dir`
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Self {
        Config {
            base_dir: base_dir.into(),
            ..Config::default()
        }
    }

    /// Load `excelerate.toml` from `base_dir` if present, else defaults
    ///
    /// `base_dir` always wins over a `base_dir` key in the file.
    pub fn load(base_dir: &Path) -> Result<Self> {
        let path = base_dir.join(CONFIG_FILE_NAME);
        let mut config = if path.is_file() {
            Self::from_file(&path)?
        } else {
            Config::default()
        };
        config.base_dir = base_dir.to_path_buf();
        Ok(config)
    }

    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ExcelError::Config(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&text).map_err(|e| ExcelError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Effective output directory
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join(DEFAULT_OUTPUT_DIR_NAME))
    }

    /// Worker pool size: the configured cap bounded by available cores
    pub fn worker_count(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.max_workers.map_or(cores, |cap| cap.min(cores)).max(1)
    }

    /// Reject settings the pipeline cannot honor
    pub fn validate(&self) -> Result<()> {
        let chunk = &self.chunk;
        if self.max_workers == Some(0) {
            return Err(ExcelError::Config("max_workers must be at least 1".into()));
        }
        if chunk.min_rows == 0 {
            return Err(ExcelError::Config("chunk.min_rows must be at least 1".into()));
        }
        if chunk.min_rows > chunk.max_rows {
            return Err(ExcelError::Config(format!(
                "chunk.min_rows ({}) exceeds chunk.max_rows ({})",
                chunk.min_rows, chunk.max_rows
            )));
        }
        if chunk.shrink_divisor < 2 {
            return Err(ExcelError::Config("chunk.shrink_divisor must be at least 2".into()));
        }
        if chunk.row_footprint_bytes == 0 {
            return Err(ExcelError::Config("chunk.row_footprint_bytes must be positive".into()));
        }
        if !(chunk.memory_share > 0.0 && chunk.memory_share <= 1.0) {
            return Err(ExcelError::Config(format!(
                "chunk.memory_share must be in (0, 1], got {}",
                chunk.memory_share
            )));
        }
        if self.extension.trim_start_matches('.').is_empty() {
            return Err(ExcelError::Config("extension must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.chunk.min_rows, 500);
        assert_eq!(config.chunk.shrink_divisor, 2);
        assert_eq!(config.output_dir(), PathBuf::from("./ExcelerateCSV"));
    }

    #[test]
    fn test_load_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "file_prefix = \"INV_\"\nmax_retries = 5\n\n[chunk]\nmin_rows = 10\n",
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.file_prefix, "INV_");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.chunk.min_rows, 10);
        assert_eq!(config.chunk.max_rows, 1_000_000);
        assert_eq!(config.base_dir, dir.path());
    }

    #[test]
    fn test_load_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.file_prefix, "");
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "max_retires = 5\n").unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(ExcelError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let mut config = Config::default();
        config.chunk.min_rows = 10;
        config.chunk.max_rows = 5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.chunk.shrink_divisor = 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.max_workers = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.chunk.memory_share = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_worker_count_is_capped() {
        let mut config = Config::default();
        config.max_workers = Some(1);
        assert_eq!(config.worker_count(), 1);
        config.max_workers = Some(10_000);
        assert!(config.worker_count() <= 10_000);
    }
}
