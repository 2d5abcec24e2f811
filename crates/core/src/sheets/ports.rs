//! Port interface for the spreadsheet provider API

use async_trait::async_trait;
use orderlink_domain::OrderLinkError;
use thiserror::Error;

/// Rows of cell values as returned by the provider. Trailing empty cells
/// and rows may be omitted, so rows can be ragged.
pub type CellGrid = Vec<Vec<String>>;

/// Failure talking to the spreadsheet API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SheetsError {
    /// HTTP 429.
    #[error("spreadsheet API rate limit exceeded")]
    RateLimited,

    /// Any other non-success status.
    #[error("spreadsheet API returned {status}: {message}")]
    Http { status: u16, message: String },

    /// No response: connection failure or timeout.
    #[error("network error: {0}")]
    Network(String),

    /// HTTP 401 or 403.
    #[error("access token rejected by spreadsheet API")]
    Unauthorized,

    /// Body could not be decoded.
    #[error("invalid spreadsheet API response: {0}")]
    InvalidResponse(String),
}

impl SheetsError {
    /// Rate limits, network failures and 5xx are worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited | Self::Network(_) => true,
            Self::Http { status, .. } => *status >= 500,
            Self::Unauthorized | Self::InvalidResponse(_) => false,
        }
    }
}

impl From<SheetsError> for OrderLinkError {
    fn from(err: SheetsError) -> Self {
        match &err {
            SheetsError::RateLimited => Self::RateLimited(err.to_string()),
            SheetsError::Unauthorized => Self::Unauthorized(err.to_string()),
            SheetsError::Http { status: 404, .. } => Self::NotFound(err.to_string()),
            SheetsError::Http { .. } | SheetsError::Network(_) => Self::Network(err.to_string()),
            SheetsError::InvalidResponse(_) => Self::Internal(err.to_string()),
        }
    }
}

/// A block of values to write at an A1 range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellUpdate {
    /// A1 range to write.
    pub range: String,
    /// Rows of values for the range.
    pub values: CellGrid,
}

impl CellUpdate {
    /// A single-cell write.
    pub fn single(range: impl Into<String>, value: impl Into<String>) -> Self {
        Self { range: range.into(), values: vec![vec![value.into()]] }
    }
}

/// Background colour applied to a processed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowHighlight {
    /// Order created.
    Created,
    /// Order created but flagged as a possible duplicate.
    Flagged,
    /// Row rejected or failed.
    Failed,
}

impl RowHighlight {
    /// RGB components in `0.0..=1.0`.
    #[must_use]
    pub const fn rgb(self) -> (f32, f32, f32) {
        match self {
            Self::Created => (0.85, 0.95, 0.85),
            Self::Flagged => (1.0, 0.95, 0.8),
            Self::Failed => (0.98, 0.85, 0.85),
        }
    }
}

/// Spreadsheet API client. Every call carries the caller's access token.
#[async_trait]
pub trait SheetsClient: Send + Sync {
    /// Values of `range` (A1 notation), formatted as displayed.
    async fn read_range(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<CellGrid, SheetsError>;

    /// Write several ranges in one request.
    async fn update_values(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        updates: &[CellUpdate],
    ) -> Result<(), SheetsError>;

    /// Colour whole rows (1-based row numbers) of `sheet_name`.
    async fn highlight_rows(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        sheet_name: &str,
        rows: &[(u32, RowHighlight)],
    ) -> Result<(), SheetsError>;
}
