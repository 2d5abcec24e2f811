//! Background triggers
//!
//! The polling scheduler follows the usual lifecycle rules: explicit
//! start/stop, a kept join handle and a cancellation token that also
//! cancels the sync in flight.

pub mod error;
pub mod polling;

pub use error::{SchedulerError, SchedulerResult};
pub use polling::{PollSummary, PollingScheduler, PollingSchedulerConfig};
