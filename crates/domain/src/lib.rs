//! # OrderLink Domain
//!
//! Business domain types for the connection and spreadsheet order
//! synchronization engine.
//!
//! This crate contains:
//! - Connection, sync operation, sheet row and order types
//! - Domain error types and Result definitions
//! - Configuration structures
//! - Domain constants
//!
//! ## Architecture
//! - Depends only on `orderlink-common` (error conversion)
//! - Pure domain models and data structures, no I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
