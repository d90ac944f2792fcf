//! Logging for the command-line tool: colored stderr plus a rolling run log

use crate::error::{ExcelError, Result};
use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

/// Run log files are named `excelerate.<date>.log`
pub const LOG_FILE_PREFIX: &str = "excelerate";
pub const LOG_FILE_SUFFIX: &str = "log";

/// Rotated run logs kept in the output directory
const MAX_LOG_FILES: usize = 5;

/// Daily-rotated run log in `dir`, keeping the newest five files
pub fn rolling_log_file(dir: &Path) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
        .map_err(|e| {
            ExcelError::IoWrite(format!("cannot open run log in {}: {}", dir.display(), e))
        })
}

/// Install the global logger
///
/// Dependencies log at warn; this crate at info, or debug when `verbose`.
/// `RUST_LOG` still overrides both. With `log_dir`, every record that
/// passes the filter is also appended, uncolored, to the run log there.
pub fn setup_logging(verbose: bool, log_dir: Option<&Path>) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let (run_log, open_error) = match log_dir.map(rolling_log_file) {
        Some(Ok(appender)) => (Some(Mutex::new(appender)), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    let installed = Builder::new()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_CRATE_NAME"), level)
        .parse_default_env()
        .format(move |buf, record| {
            if let Some(file) = &run_log {
                if let Ok(mut file) = file.lock() {
                    let _ = writeln!(
                        file,
                        "{} {:<5} {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                        record.level(),
                        record.args()
                    );
                }
            }

            let name = env!("CARGO_PKG_NAME");
            let line = match record.level() {
                Level::Error => format!("[{} {}] {}", name.cyan(), "ERROR".red(), record.args()),
                Level::Warn => format!("[{} {}] {}", name.cyan(), "WARN".yellow(), record.args()),
                Level::Debug | Level::Trace => format!(
                    "[{} {} {}] {}",
                    name.cyan(),
                    "DEBUG".dimmed(),
                    record.target().white(),
                    record.args()
                ),
                Level::Info => format!("[{}] {}", name.cyan(), record.args()),
            };
            writeln!(buf, "{}", line)
        })
        // tests and embedding programs may have installed one already
        .try_init()
        .is_ok();

    if let (true, Some(e)) = (installed, open_error) {
        log::warn!("{}; logging to the terminal only", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_log_written_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut appender = rolling_log_file(dir.path()).unwrap();
        writeln!(appender, "retrying with 250 rows").unwrap();
        appender.flush().unwrap();

        let logs: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(logs.len(), 1);
        let name = logs[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(LOG_FILE_PREFIX));
        assert!(name.ends_with(LOG_FILE_SUFFIX));
        let text = std::fs::read_to_string(&logs[0]).unwrap();
        assert!(text.contains("retrying with 250 rows"));
    }

    #[test]
    fn test_unusable_dir_is_io_write() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not_a_dir");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            rolling_log_file(&file),
            Err(ExcelError::IoWrite(_))
        ));
    }
}
