//! Duplicate detection for incoming sheet rows.

pub mod detector;
pub mod ports;
pub mod resolution;
pub mod scoring;

pub use detector::DuplicateDetector;
pub use resolution::DuplicateResolution;
pub use scoring::{fuzzy_match, weighted_match, MatchScore};
