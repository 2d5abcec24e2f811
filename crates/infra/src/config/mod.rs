//! Configuration loading
//!
//! Loads [`orderlink_domain::Config`] from `.env`, environment variables or
//! a TOML/JSON file, and validates it before handing it out.

pub mod loader;

pub use loader::{load, load_from_env, load_from_file, find_config_path};
