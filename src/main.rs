//! excelerate CLI: convert a directory of CSV files into Excel workbooks.

use anyhow::Result;
use clap::Parser;
use excelerate::cli::{handle_run, Cli};
use std::process::ExitCode;
use std::time::Instant;

fn main() -> Result<ExitCode> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    let code = handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(code)
}
