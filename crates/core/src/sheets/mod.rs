//! Spreadsheet access: provider port, header detection and row parsing.

pub mod headers;
pub mod ports;
pub mod reader;

pub use headers::detect_mapping;
pub use reader::{
    a1_range, cell_ref, column_index, column_letter, parse_rows, MalformedRow, SheetRead, SheetReader,
};
