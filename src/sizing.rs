//! Chunk sizing from available memory, and shrinking on retry

use crate::config::ChunkConfig;
use std::fmt;

/// Smallest byte length a CSV row can have (one character plus a newline)
const MIN_ROW_BYTES: u64 = 2;

/// Number of rows materialized per chunk; always at least 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct ChunkSize(usize);

impl ChunkSize {
    /// Clamp `rows` to at least 1
    pub fn new(rows: usize) -> Self {
        ChunkSize(rows.max(1))
    }

    pub fn rows(self) -> usize {
        self.0
    }
}

impl fmt::Display for ChunkSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rows", self.0)
    }
}

/// Computes and shrinks chunk sizes within configured bounds
#[derive(Debug, Clone)]
pub struct ChunkSizer {
    floor: usize,
    max: usize,
    divisor: usize,
    row_footprint_bytes: u64,
    memory_share: f64,
}

impl ChunkSizer {
    /// Build from validated config; degenerate values are clamped
    pub fn new(config: &ChunkConfig) -> Self {
        let floor = config.min_rows.max(1);
        ChunkSizer {
            floor,
            max: config.max_rows.max(floor),
            divisor: config.shrink_divisor.max(2),
            row_footprint_bytes: config.row_footprint_bytes.max(1),
            memory_share: config.memory_share.clamp(f64::MIN_POSITIVE, 1.0),
        }
    }

    pub fn floor(&self) -> ChunkSize {
        ChunkSize(self.floor)
    }

    /// Assumed memory cost of one materialized row
    pub fn row_footprint_bytes(&self) -> u64 {
        self.row_footprint_bytes
    }

    /// Initial chunk for a file of `file_size_bytes` given free memory
    ///
    /// Rows that fit in the memory share, capped by the maximum and by how
    /// many rows the file could possibly hold, floored at the minimum.
    pub fn initial(&self, file_size_bytes: u64, available_memory_bytes: u64) -> ChunkSize {
        let budget = (available_memory_bytes as f64 * self.memory_share) as u64;
        let by_memory = budget / self.row_footprint_bytes;
        let by_file = (file_size_bytes / MIN_ROW_BYTES).max(1);

        let rows = by_memory.min(by_file).min(self.max as u64) as usize;
        ChunkSize(rows.max(self.floor))
    }

    /// Next smaller chunk, or the floor unchanged when already there
    pub fn shrink(&self, current: ChunkSize) -> ChunkSize {
        ChunkSize((current.0 / self.divisor).max(self.floor))
    }

    /// Whether [`ChunkSizer::shrink`] would make progress
    pub fn can_shrink(&self, current: ChunkSize) -> bool {
        current.0 > self.floor
    }

    /// Bytes needed to materialize a chunk of `size`
    pub fn footprint(&self, size: ChunkSize) -> u64 {
        (size.0 as u64).saturating_mul(self.row_footprint_bytes)
    }
}
