//! CSV utilities for delimiter detection and parsing

mod detect;
mod parser;

pub use detect::{Delimiter, DelimiterDetector, DEFAULT_SAMPLE_BYTES};
pub use parser::CsvParser;
