//! Text helpers shared by reading, validation and matching.

pub mod text;
