//! Progress bar over a batch of conversions

use crate::audit::OutcomeSink;
use crate::types::ConversionOutcome;
use kdam::{Animation, Bar, BarExt};
use std::sync::Mutex;

/// Advances a bar per finished job, then forwards to `inner`
pub struct ProgressSink<S> {
    inner: S,
    bar: Mutex<Bar>,
}

impl<S: OutcomeSink> ProgressSink<S> {
    pub fn new(inner: S, total: usize) -> Self {
        let bar = kdam::tqdm!(
            total = total,
            desc = "Converting",
            animation = Animation::Classic,
            unit = " files"
        );
        ProgressSink {
            inner,
            bar: Mutex::new(bar),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Close the bar so later output starts on a fresh line
    pub fn finish(&self) {
        if let Ok(mut bar) = self.bar.lock() {
            let _ = bar.refresh();
            eprintln!();
        }
    }
}

impl<S: OutcomeSink> OutcomeSink for ProgressSink<S> {
    fn record(&self, outcome: &ConversionOutcome) {
        self.inner.record(outcome);
        if let Ok(mut bar) = self.bar.lock() {
            let _ = bar.update(1);
        }
    }
}
