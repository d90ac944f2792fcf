//! Retry on memory exhaustion with shrinking chunk sizes

use crate::error::Result;
use crate::sizing::ChunkSizer;
use crate::types::ConversionJob;
use log::{debug, error, warn};
use std::fmt;

/// States of one job's retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Ready,
    Attempting,
    Retrying,
    Succeeded,
    GivenUp,
}

impl RetryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RetryState::Succeeded | RetryState::GivenUp)
    }

    fn can_move_to(self, next: RetryState) -> bool {
        use RetryState::*;
        matches!(
            (self, next),
            (Ready, Attempting)
                | (Attempting, Succeeded)
                | (Attempting, Retrying)
                | (Attempting, GivenUp)
                | (Retrying, Attempting)
        )
    }
}

impl fmt::Display for RetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetryState::Ready => "ready",
            RetryState::Attempting => "attempting",
            RetryState::Retrying => "retrying",
            RetryState::Succeeded => "succeeded",
            RetryState::GivenUp => "given up",
        };
        f.write_str(name)
    }
}

/// Result of driving a job to a terminal state
#[derive(Debug)]
pub struct RetryRun<T> {
    pub result: Result<T>,
    /// Every state visited, starting with `Ready`
    pub history: Vec<RetryState>,
}

impl<T> RetryRun<T> {
    /// Terminal state the job ended in
    pub fn state(&self) -> RetryState {
        self.history.last().copied().unwrap_or(RetryState::Ready)
    }
}

/// Re-runs an attempt after memory exhaustion with a smaller chunk size
///
/// A retry happens only while `attempt_count < max_retries` and the sizer
/// can still shrink the job's chunk, so `chunk_size` strictly decreases
/// across retries. Any other error ends the job immediately.
#[derive(Debug, Clone)]
pub struct RetryController {
    sizer: ChunkSizer,
    max_retries: u32,
}

impl RetryController {
    pub fn new(sizer: ChunkSizer, max_retries: u32) -> Self {
        RetryController { sizer, max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Drive `job` through `attempt` until it succeeds or gives up
    pub fn run<T, F>(&self, job: &mut ConversionJob, mut attempt: F) -> RetryRun<T>
    where
        F: FnMut(&mut ConversionJob) -> Result<T>,
    {
        let name = job.file_name();
        let mut history = vec![RetryState::Ready];
        let enter = |history: &mut Vec<RetryState>, next: RetryState| {
            let current = history.last().copied().unwrap_or(RetryState::Ready);
            debug_assert!(
                current.can_move_to(next),
                "invalid retry transition {} -> {}",
                current,
                next
            );
            debug!("{}: {} -> {}", name, current, next);
            history.push(next);
        };

        loop {
            enter(&mut history, RetryState::Attempting);

            let err = match attempt(&mut *job) {
                Ok(value) => {
                    enter(&mut history, RetryState::Succeeded);
                    return RetryRun {
                        result: Ok(value),
                        history,
                    };
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                enter(&mut history, RetryState::GivenUp);
                return RetryRun {
                    result: Err(err),
                    history,
                };
            }

            if job.attempt_count >= self.max_retries || !self.sizer.can_shrink(job.chunk_size) {
                error!(
                    "{}: giving up after {} retries at {}: {}",
                    name,
                    job.attempt_count,
                    job.chunk_size,
                    err
                );
                enter(&mut history, RetryState::GivenUp);
                return RetryRun {
                    result: Err(err),
                    history,
                };
            }

            let next = self.sizer.shrink(job.chunk_size);
            job.attempt_count += 1;
            warn!(
                "{}: {}; retrying with {} (retry {}/{})",
                name,
                err,
                next,
                job.attempt_count,
                self.max_retries
            );
            job.chunk_size = next;
            enter(&mut history, RetryState::Retrying);
        }
    }
}
