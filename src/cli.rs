//! Command-line front end: argument parsing, batch run and summary output

use crate::audit::{AuditLog, BatchSummary};
use crate::config::Config;
use crate::logger::setup_logging;
use crate::memory::SystemMemory;
use crate::progress::ProgressSink;
use crate::scan::{ensure_output_dir, find_input_files};
use crate::scheduler::JobScheduler;
use crate::types::ConversionOutcome;
use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;

struct DefaultArgs;

impl DefaultArgs {
    pub const DIR: &'static str = ".";
}

/// Convert every matching CSV file in a directory into an Excel workbook.
#[derive(Clone, Debug, Parser)]
#[command(name = "excelerate", version)]
#[command(about = "Bulk CSV to XLSX conversion with adaptive chunking and retry on memory pressure.")]
pub struct Cli {
    /// Directory to scan (recursively). Default: current directory.
    #[arg(value_name = "DIR", default_value = DefaultArgs::DIR)]
    pub dir: PathBuf,

    /// Only convert files whose name starts with this prefix.
    #[arg(long, short = 'p')]
    pub prefix: Option<String>,

    /// Output directory. Default: `ExcelerateCSV` in DIR.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Maximum number of files converted at once. Default: all cores.
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Retries allowed per file after running out of memory.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Smallest chunk (rows) a retry may shrink to.
    #[arg(long)]
    pub min_chunk: Option<usize>,

    /// Largest initial chunk (rows).
    #[arg(long)]
    pub max_chunk: Option<usize>,

    /// Do not append a timestamp to output file names.
    #[arg(long)]
    pub no_timestamp: bool,

    /// Re-read each workbook after writing and check its row count.
    #[arg(long)]
    pub verify: bool,

    /// Config file. Default: `excelerate.toml` in DIR, if present.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Verbose output.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Cli {
    /// Settings from the config file with command-line flags on top
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                let mut config = Config::from_file(path)?;
                config.base_dir = self.dir.clone();
                config
            }
            None => Config::load(&self.dir)?,
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut Config) {
        if let Some(prefix) = &self.prefix {
            config.file_prefix = prefix.clone();
        }
        if let Some(output) = &self.output {
            config.output_dir = Some(output.clone());
        }
        if let Some(workers) = self.workers {
            config.max_workers = Some(workers);
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(min) = self.min_chunk {
            config.chunk.min_rows = min;
        }
        if let Some(max) = self.max_chunk {
            config.chunk.max_rows = max;
        }
        if self.no_timestamp {
            config.timestamp_suffix = false;
        }
        if self.verify {
            config.verify_output = true;
        }
    }
}

/// Run one batch; the exit code is non-zero only when every file failed
pub fn handle_run(cli: &Cli) -> Result<ExitCode> {
    let config = cli.resolve_config()?;
    let output_dir = config.output_dir();
    ensure_output_dir(&output_dir)?;
    setup_logging(cli.verbose, Some(&output_dir));
    debug!("{:?}", config);

    let files = find_input_files(&config)?;
    if files.is_empty() {
        warn!(
            "no files matching '{}*.{}' under {}",
            config.file_prefix,
            config.extension,
            config.base_dir.display()
        );
        return Ok(ExitCode::SUCCESS);
    }

    let audit = AuditLog::open_in(&output_dir)
        .with_context(|| format!("cannot open audit log in {}", output_dir.display()))?;
    info!("audit log: {}", audit.path().display());

    let memory = Arc::new(SystemMemory::new());
    let scheduler = JobScheduler::new(config, memory.clone())?;

    let stop = scheduler.stop_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    }) {
        warn!("Ctrl-C will not stop the batch cleanly: {}", e);
    }

    let sink = ProgressSink::new(audit, files.len());
    let outcomes = scheduler.run(&files, &sink)?;
    sink.finish();

    let summary = BatchSummary::from_outcomes(&outcomes);
    print_summary(&outcomes, &summary);
    info!(
        "batch finished: {} of {} converted, {} failed, {} rows written, {} skipped in {:.2}s",
        summary.succeeded,
        summary.total_files,
        summary.failed,
        summary.rows_written,
        summary.rows_skipped,
        summary.total_time.as_secs_f64()
    );
    let (used, total) = memory.usage();
    info!(
        "memory: {} MiB used of {} MiB",
        used / (1024 * 1024),
        total / (1024 * 1024)
    );

    if summary.all_failed() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn print_summary(outcomes: &[ConversionOutcome], summary: &BatchSummary) {
    println!();
    println!(
        "{:<8} {:<40} {:>10} {:>8} {:>8} {:>9}",
        "STATUS".bold(),
        "FILE".bold(),
        "ROWS".bold(),
        "SKIPPED".bold(),
        "RETRIES".bold(),
        "TIME".bold()
    );
    for outcome in outcomes {
        let status = if outcome.is_success() {
            format!("{:<8}", "OK").green()
        } else {
            format!("{:<8}", "FAILED").red()
        };
        println!(
            "{} {:<40} {:>10} {:>8} {:>8} {:>8.2}s",
            status,
            truncate(&outcome.file_name(), 40),
            outcome.rows_written,
            outcome.rows_skipped,
            outcome.attempts,
            outcome.duration.as_secs_f64()
        );
        if let Some(detail) = &outcome.error {
            println!("         {}", detail.message.dimmed());
        }
    }

    println!();
    let failed = if summary.failed > 0 {
        summary.failed.to_string().red()
    } else {
        summary.failed.to_string().normal()
    };
    println!(
        "{} files: {} converted, {} failed, {} rows written, {} rows skipped",
        summary.total_files,
        summary.succeeded.to_string().green(),
        failed,
        summary.rows_written,
        summary.rows_skipped
    );
}

fn truncate(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        return name.to_string();
    }
    let kept: String = name.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("excelerate.toml"),
            "file_prefix = \"from_file\"\nmax_retries = 5\n[chunk]\nmin_rows = 100\n",
        )
        .unwrap();

        let cli = Cli::parse_from([
            "excelerate",
            dir.path().to_str().unwrap(),
            "--max-retries",
            "1",
            "--no-timestamp",
        ]);
        let config = cli.resolve_config().unwrap();

        assert_eq!(config.file_prefix, "from_file");
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.chunk.min_rows, 100);
        assert!(!config.timestamp_suffix);
        assert_eq!(config.base_dir, dir.path());
    }

    #[test]
    fn test_invalid_flags_rejected() {
        let cli = Cli::parse_from(["excelerate", ".", "--min-chunk", "10", "--max-chunk", "5"]);
        assert!(cli.resolve_config().is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short.csv", 40), "short.csv");
        assert_eq!(truncate("abcdefghij", 6), "abc...");
    }
}
