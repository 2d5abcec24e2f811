//! Google Sheets v4 REST client
//!
//! Reads formatted cell values, writes values back with `USER_ENTERED`
//! semantics and colours processed rows. The sync orchestrator owns retry
//! and backoff, so every call is a single attempt.

use std::time::Duration;

use async_trait::async_trait;
use orderlink_core::sheets::ports::{CellGrid, CellUpdate, RowHighlight};
use orderlink_core::{SheetsClient, SheetsError};
use orderlink_domain::{OrderLinkError, Result};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use crate::http::HttpClient;

/// Google Sheets API host.
pub const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMetadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// [`SheetsClient`] for the Google Sheets REST API.
#[derive(Clone)]
pub struct GoogleSheetsClient {
    base_url: Url,
    http_client: HttpClient,
}

impl GoogleSheetsClient {
    /// Client for the public API with the default timeout.
    pub fn new() -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Self::with_base_url(DEFAULT_SHEETS_BASE_URL, http_client)
    }

    /// Point the client at another host (tests use a mock server).
    pub fn with_base_url(base_url: &str, http_client: HttpClient) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|err| {
            OrderLinkError::Config(format!("invalid sheets base url {base_url}: {err}"))
        })?;
        Ok(Self { base_url, http_client })
    }

    /// `{base}/v4/spreadsheets/{id}/{tail...}` with each segment escaped.
    fn endpoint(&self, spreadsheet_id: &str, tail: &[&str]) -> std::result::Result<Url, SheetsError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| SheetsError::InvalidResponse("base url cannot carry a path".into()))?;
            segments.pop_if_empty().extend(["v4", "spreadsheets", spreadsheet_id]);
            segments.extend(tail);
        }
        Ok(url)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        access_token: &str,
        body: Option<Value>,
    ) -> std::result::Result<T, SheetsError> {
        let mut request = self.http_client.request(method, url).bearer_auth(access_token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = self.http_client.send(request).await?;
        let response = ensure_success(response).await?;
        let text = response.text().await.map_err(|err| SheetsError::Network(err.to_string()))?;
        serde_json::from_str(&text).map_err(|err| SheetsError::InvalidResponse(err.to_string()))
    }

    /// `{base}/v4/spreadsheets/{id}:batchUpdate`
    fn endpoint_batch_update(&self, spreadsheet_id: &str) -> std::result::Result<Url, SheetsError> {
        self.endpoint(&format!("{spreadsheet_id}:batchUpdate"), &[])
    }

    async fn sheet_id(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        sheet_name: &str,
    ) -> std::result::Result<i64, SheetsError> {
        let mut url = self.endpoint(spreadsheet_id, &[])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties");
        let metadata: SpreadsheetMetadata = self.execute(Method::GET, url, access_token, None).await?;

        metadata
            .sheets
            .into_iter()
            .find(|sheet| sheet.properties.title == sheet_name)
            .map(|sheet| sheet.properties.sheet_id)
            .ok_or_else(|| SheetsError::Http {
                status: StatusCode::NOT_FOUND.as_u16(),
                message: format!("sheet {sheet_name:?} not found in spreadsheet"),
            })
    }
}

#[async_trait]
impl SheetsClient for GoogleSheetsClient {
    async fn read_range(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        range: &str,
    ) -> std::result::Result<CellGrid, SheetsError> {
        let mut url = self.endpoint(spreadsheet_id, &["values", range])?;
        url.query_pairs_mut()
            .append_pair("majorDimension", "ROWS")
            .append_pair("valueRenderOption", "FORMATTED_VALUE");

        let values: ValueRange = self.execute(Method::GET, url, access_token, None).await?;
        debug!(spreadsheet_id, range, rows = values.values.len(), "read sheet range");

        Ok(values.values.into_iter().map(|row| row.into_iter().map(cell_text).collect()).collect())
    }

    async fn update_values(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        updates: &[CellUpdate],
    ) -> std::result::Result<(), SheetsError> {
        if updates.is_empty() {
            return Ok(());
        }

        let url = self.endpoint(spreadsheet_id, &["values:batchUpdate"])?;
        let data: Vec<Value> = updates
            .iter()
            .map(|update| json!({ "range": update.range, "majorDimension": "ROWS", "values": update.values }))
            .collect();
        let body = json!({ "valueInputOption": "USER_ENTERED", "data": data });

        let _: Value = self.execute(Method::POST, url, access_token, Some(body)).await?;
        debug!(spreadsheet_id, ranges = updates.len(), "updated sheet values");
        Ok(())
    }

    async fn highlight_rows(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        sheet_name: &str,
        rows: &[(u32, RowHighlight)],
    ) -> std::result::Result<(), SheetsError> {
        if rows.is_empty() {
            return Ok(());
        }

        let sheet_id = self.sheet_id(access_token, spreadsheet_id, sheet_name).await?;
        let requests: Vec<Value> = rows
            .iter()
            .filter(|(row, _)| *row > 0)
            .map(|(row, highlight)| repeat_cell_request(sheet_id, *row, *highlight))
            .collect();
        if requests.is_empty() {
            return Ok(());
        }

        let url = self.endpoint_batch_update(spreadsheet_id)?;
        let _: Value =
            self.execute(Method::POST, url, access_token, Some(json!({ "requests": requests }))).await?;
        debug!(spreadsheet_id, sheet_name, rows = rows.len(), "highlighted sheet rows");
        Ok(())
    }
}

fn repeat_cell_request(sheet_id: i64, row: u32, highlight: RowHighlight) -> Value {
    let (red, green, blue) = highlight.rgb();
    json!({
        "repeatCell": {
            "range": {
                "sheetId": sheet_id,
                "startRowIndex": row - 1,
                "endRowIndex": row,
            },
            "cell": {
                "userEnteredFormat": {
                    "backgroundColor": { "red": red, "green": green, "blue": blue }
                }
            },
            "fields": "userEnteredFormat.backgroundColor",
        }
    })
}

/// Formatted values are strings, but numbers and booleans still show up
/// for some cell types.
fn cell_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

async fn ensure_success(response: Response) -> std::result::Result<Response, SheetsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
        .map(|envelope| envelope.error.message)
        .unwrap_or(body);
    warn!(status = status.as_u16(), %message, "sheets API request failed");

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => SheetsError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SheetsError::Unauthorized,
        _ => SheetsError::Http { status: status.as_u16(), message },
    })
}
