//! Sheet-to-order synchronization: orchestration, validation, feedback and
//! triggers.

pub mod feedback;
pub mod orchestrator;
pub mod ports;
pub mod validation;
pub mod webhook;

pub use feedback::{FeedbackKind, FeedbackWriter, RowFeedback};
pub use orchestrator::{RowOutcome, SyncOrchestrator, SyncServices};
pub use validation::{RowValidator, ValidationIssue};
pub use webhook::{WebhookHandler, WebhookOutcome};
