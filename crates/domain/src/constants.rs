//! Domain constants
//!
//! Thresholds and defaults shared by the lifecycle manager, the duplicate
//! detector and the sync orchestrator.

// Authorization
/// Maximum age of an OAuth state at code exchange.
pub const AUTH_STATE_TTL_SECS: i64 = 600;
/// Refresh access tokens expiring within this window.
pub const TOKEN_REFRESH_SKEW_SECS: i64 = 600;
/// Assumed lifetime when a token response omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

// Token refresh / feedback retry
/// Attempts, first one included.
pub const RETRY_MAX_ATTEMPTS: u32 = 3;
/// Delay after the first failure; doubles after each.
pub const RETRY_BASE_DELAY_MS: u64 = 1000;

// Batch sync
/// Rows per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;
/// Rows processed at once within a batch.
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;
/// Pause between batches.
pub const INTER_BATCH_DELAY_MS: u64 = 100;
/// Polling tick interval.
pub const DEFAULT_POLLING_INTERVAL_SECS: u64 = 300;
/// Stock given to products created from sheet rows.
pub const DEFAULT_PRODUCT_STOCK: i64 = 100;

// Duplicate detection
/// Scores at or above this are exact duplicates and skipped.
pub const EXACT_MATCH_THRESHOLD: f64 = 0.95;
/// Flag notes say "Likely" at or above this, "Possible" below.
pub const FLAG_HIGH_THRESHOLD: f64 = 0.85;
/// Scores at or above this create the order flagged.
pub const SIMILAR_MATCH_THRESHOLD: f64 = 0.7;
/// Minimum edit-distance score for the fuzzy tier.
pub const FUZZY_MATCH_THRESHOLD: f64 = 0.8;
/// Days before the row date searched by the window tier.
pub const EXTENDED_WINDOW_DAYS_BEFORE: i64 = 7;
/// Days after the row date searched by the window tier.
pub const EXTENDED_WINDOW_DAYS_AFTER: i64 = 1;
/// Same-phone candidates scored by the window tier.
pub const EXTENDED_WINDOW_LIMIT: usize = 5;
/// Same-day candidates scored by the fuzzy tier.
pub const FUZZY_CANDIDATE_LIMIT: usize = 10;
/// Characters of the address compared as a prefix.
pub const ADDRESS_PREFIX_LEN: usize = 20;
/// Prices closer than this count as equal.
pub const PRICE_TOLERANCE: f64 = 1.0;

// Order numbering
/// Minimum width of the per-day order sequence.
pub const ORDER_SEQUENCE_DIGITS: usize = 4;
