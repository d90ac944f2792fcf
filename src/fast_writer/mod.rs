//! Streaming XLSX writer
//!
//! Rows are serialized to SpreadsheetML as they arrive and compressed into
//! the workbook file immediately; nothing but the shared strings table is
//! kept in memory.

mod shared_strings;
mod workbook;
mod xml_writer;

pub use shared_strings::SharedStrings;
pub use workbook::{WorkbookWriter, DEFAULT_SHEET_NAME, MAX_SHEET_ROWS};
pub use xml_writer::{strip_invalid_xml, XmlWriter};
