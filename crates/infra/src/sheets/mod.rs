//! Spreadsheet provider adapters

pub mod google;

pub use google::GoogleSheetsClient;
