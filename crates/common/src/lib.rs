//! Shared primitives for OrderLink crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error types
//! - `runtime`: token cipher, retry with backoff, keyed single-flight
//! - `platform`: OAuth helpers (PKCE and state generation)
//!
//! Nothing in this crate knows about connections, sheets or orders; those
//! live in `orderlink-domain` and `orderlink-core`.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod crypto;
#[cfg(feature = "runtime")]
pub mod resilience;
#[cfg(feature = "runtime")]
pub mod sync;

// Platform tier
// -------------------------------------------------------------------
#[cfg(feature = "platform")]
pub mod auth;

// Re-export commonly used types
// ------------------------
#[cfg(feature = "runtime")]
pub use crypto::TokenCipher;
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult};
#[cfg(feature = "runtime")]
pub use resilience::{retry_with_backoff, BackoffPolicy};
#[cfg(feature = "runtime")]
pub use sync::{SingleFlight, SingleFlightError};
