//! Parallel batch execution over a bounded worker pool

use crate::audit::OutcomeSink;
use crate::config::Config;
use crate::converter::ChunkedConverter;
use crate::error::{ExcelError, Result};
use crate::memory::MemoryProbe;
use crate::retry::RetryController;
use crate::scan::{ensure_output_dir, target_path_for};
use crate::sizing::{ChunkSize, ChunkSizer};
use crate::types::{ConversionJob, ConversionOutcome, ConversionReport};
use log::{debug, info};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One attempt at converting a single file
///
/// [`ChunkedConverter`] is the real implementation; the seam lets callers
/// wrap or replace the per-file step.
pub trait FileConverter: Sync {
    fn initial_chunk_size(&self, path: &Path) -> ChunkSize;
    fn convert(&self, job: &mut ConversionJob) -> Result<ConversionReport>;
}

impl FileConverter for ChunkedConverter {
    fn initial_chunk_size(&self, path: &Path) -> ChunkSize {
        ChunkedConverter::initial_chunk_size(self, path)
    }

    fn convert(&self, job: &mut ConversionJob) -> Result<ConversionReport> {
        ChunkedConverter::convert(self, job)
    }
}

/// Runs one job per input file across a fixed pool of workers
///
/// Each job is owned by exactly one worker for its whole life, including
/// its retries. Outcomes reach the sink as jobs finish and are returned in
/// input order. Setting the stop flag lets running jobs finish and reports
/// the jobs not yet started as cancelled.
pub struct JobScheduler {
    config: Config,
    memory: Arc<dyn MemoryProbe>,
    stop: Arc<AtomicBool>,
}

impl JobScheduler {
    /// Validate `config` and build a scheduler around it
    pub fn new(config: Config, memory: Arc<dyn MemoryProbe>) -> Result<Self> {
        config.validate()?;
        Ok(JobScheduler {
            config,
            memory,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Flag that, once set, stops new jobs from starting
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Converter configured from this scheduler's settings
    pub fn converter(&self) -> ChunkedConverter {
        ChunkedConverter::new(ChunkSizer::new(&self.config.chunk), Arc::clone(&self.memory))
            .with_verification(self.config.verify_output)
    }

    /// Convert every file in `files` with the default converter
    pub fn run(&self, files: &[PathBuf], sink: &dyn OutcomeSink) -> Result<Vec<ConversionOutcome>> {
        let converter = self.converter();
        self.run_with(&converter, files, sink)
    }

    /// Convert every file in `files` with `converter`
    ///
    /// Fails only when the batch itself cannot start (output directory or
    /// worker pool); per-file failures are reported as outcomes.
    pub fn run_with(
        &self,
        converter: &dyn FileConverter,
        files: &[PathBuf],
        sink: &dyn OutcomeSink,
    ) -> Result<Vec<ConversionOutcome>> {
        let output_dir = self.config.output_dir();
        ensure_output_dir(&output_dir)?;

        let targets = self.plan_targets(files, &output_dir);
        let workers = self.config.worker_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("excelerate-worker-{}", i))
            .build()
            .map_err(|e| ExcelError::Config(format!("cannot start worker pool: {}", e)))?;

        info!(
            "converting {} files with {} workers into {}",
            files.len(),
            workers,
            output_dir.display()
        );

        let retry = RetryController::new(ChunkSizer::new(&self.config.chunk), self.config.max_retries);
        let outcomes = pool.install(|| {
            files
                .par_iter()
                .zip(targets.par_iter())
                .map(|(source, target)| {
                    let outcome = self.run_one(converter, &retry, source, target);
                    sink.record(&outcome);
                    outcome
                })
                .collect::<Vec<_>>()
        });

        Ok(outcomes)
    }

    fn run_one(
        &self,
        converter: &dyn FileConverter,
        retry: &RetryController,
        source: &Path,
        target: &Path,
    ) -> ConversionOutcome {
        if self.stop.load(Ordering::SeqCst) {
            let job = ConversionJob::new(source, target, ChunkSize::new(1));
            let err = ExcelError::Cancelled("batch stopped before this file started".into());
            return ConversionOutcome::failure(&job, &err, Duration::ZERO);
        }

        let started = Instant::now();
        let mut job = ConversionJob::new(source, target, converter.initial_chunk_size(source));
        debug!("{}: starting with {}", job.file_name(), job.chunk_size);

        let run = retry.run(&mut job, |job| converter.convert(job));
        match run.result {
            Ok(report) => ConversionOutcome::success(&job, &report, started.elapsed()),
            Err(err) => ConversionOutcome::failure(&job, &err, started.elapsed()),
        }
    }

    /// Output path per input, made unique within the batch
    fn plan_targets(&self, files: &[PathBuf], output_dir: &Path) -> Vec<PathBuf> {
        let now = chrono::Local::now();
        let timestamp = self.config.timestamp_suffix.then_some(&now);

        let mut used = HashSet::new();
        files
            .iter()
            .map(|source| {
                let base = target_path_for(source, output_dir, timestamp);
                let mut target = base.clone();
                let mut n = 2;
                while !used.insert(target.clone()) {
                    let stem = base
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    target = base.with_file_name(format!("{}_{}.xlsx", stem, n));
                    n += 1;
                }
                target
            })
            .collect()
    }
}
