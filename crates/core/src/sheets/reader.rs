//! Sheet reader adapter
//!
//! Turns a rectangular block of cell values into [`SheetOrder`]s using a
//! column-letter mapping. Blank rows are skipped silently; rows that cannot
//! be parsed are reported as [`MalformedRow`] and never abort the read.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate};
use orderlink_common::resilience::{retry_with_backoff, BackoffPolicy};
use orderlink_domain::{ColumnMapping, OrderLinkError, Result, SheetConfig, SheetField, SheetOrder};
use tracing::{debug, instrument, warn};

use super::headers::detect_mapping;
use super::ports::{CellGrid, SheetsClient, SheetsError};
use crate::utils::text::{non_blank, normalize_phone};

/// Zero-based index of a column letter: `A = 0`, `Z = 25`, `AA = 26`.
pub fn column_index(letters: &str) -> Result<usize> {
    let letters = letters.trim();
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(OrderLinkError::InvalidInput(format!("invalid column letter '{letters}'")));
    }
    let mut index: usize = 0;
    for c in letters.bytes().map(|b| b.to_ascii_uppercase()) {
        index = index
            .checked_mul(26)
            .and_then(|i| i.checked_add(usize::from(c - b'A') + 1))
            .ok_or_else(|| OrderLinkError::InvalidInput(format!("column '{letters}' out of range")))?;
    }
    Ok(index - 1)
}

/// Inverse of [`column_index`].
#[must_use]
pub fn column_letter(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        // rem < 26, always an ASCII letter
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn quoted_sheet(sheet_name: &str) -> String {
    if sheet_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        sheet_name.to_string()
    } else {
        format!("'{}'", sheet_name.replace('\'', "''"))
    }
}

/// `<Sheet>!<Col><Row>:<Col><Row>`, quoting the sheet name when needed.
#[must_use]
pub fn a1_range(sheet_name: &str, start_col: &str, start_row: u32, end_col: &str, end_row: u32) -> String {
    format!("{}!{start_col}{start_row}:{end_col}{end_row}", quoted_sheet(sheet_name))
}

/// A single cell address.
#[must_use]
pub fn cell_ref(sheet_name: &str, column: &str, row: u32) -> String {
    format!("{}!{column}{row}", quoted_sheet(sheet_name))
}

/// A row that was not blank but could not be turned into an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRow {
    /// 1-based sheet row.
    pub row_number: u32,
    /// Why the row could not be parsed.
    pub reason: String,
}

/// Parsed rows plus the mapping that was used to read them.
#[derive(Debug, Clone, Default)]
pub struct SheetRead {
    /// Parsed rows.
    pub orders: Vec<SheetOrder>,
    /// Non-blank rows that could not be parsed.
    pub malformed: Vec<MalformedRow>,
    /// Mapping used, configured or detected from the header.
    pub mapping: ColumnMapping,
}

/// Mapping resolved to column indices.
struct Columns(BTreeMap<SheetField, usize>);

impl Columns {
    fn resolve(mapping: &ColumnMapping) -> Result<Self> {
        mapping
            .iter()
            .map(|(field, letters)| Ok((field, column_index(letters)?)))
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Self)
    }

    fn last_index(&self) -> usize {
        self.0.values().copied().max().unwrap_or(0)
    }

    fn text<'a>(&self, cells: &'a [String], field: SheetField) -> &'a str {
        self.0
            .get(&field)
            .and_then(|index| cells.get(*index))
            .map_or("", |value| value.trim())
    }

    fn optional(&self, cells: &[String], field: SheetField) -> Option<String> {
        non_blank(self.text(cells, field)).map(str::to_string)
    }
}

/// Parse price text leniently: currency symbols and spaces are dropped and
/// the last `.` or `,` is the decimal separator, unless that character
/// repeats (then every separator groups thousands). Unparseable text is 0.
#[must_use]
pub fn parse_price(raw: &str) -> f64 {
    let kept: String = raw.chars().filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-')).collect();
    let decimal = kept.rfind(['.', ',']).filter(|&pos| {
        let separator = kept.as_bytes()[pos];
        kept.bytes().filter(|&b| b == separator).count() == 1
    });
    let normalized: String = kept
        .char_indices()
        .filter_map(|(index, c)| match c {
            '.' | ',' if Some(index) == decimal => Some('.'),
            '.' | ',' => None,
            _ => Some(c),
        })
        .collect();
    normalized.parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Parse quantity text leniently; unparseable or empty text is 1.
#[must_use]
pub fn parse_quantity(raw: &str) -> u32 {
    let whole = raw.trim().split(['.', ',']).next().unwrap_or("");
    let digits: String = whole.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(1)
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];

/// Parse the date formats found in hand-filled order sheets, ignoring any
/// time part.
#[must_use]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.date_naive());
    }
    let date_part = raw.split([' ', 'T']).next().unwrap_or(raw);
    DATE_FORMATS.iter().find_map(|format| NaiveDate::parse_from_str(date_part, format).ok())
}

fn parse_row(
    row_number: u32,
    cells: &[String],
    columns: &Columns,
    today: NaiveDate,
) -> std::result::Result<SheetOrder, String> {
    let raw_date = columns.text(cells, SheetField::Date);
    let order_date = if raw_date.is_empty() {
        today
    } else {
        parse_date(raw_date).ok_or_else(|| format!("unrecognised date '{raw_date}'"))?
    };

    Ok(SheetOrder {
        row_number,
        reference: columns.optional(cells, SheetField::Reference),
        order_date,
        customer_name: columns.text(cells, SheetField::CustomerName).to_string(),
        phone: normalize_phone(columns.text(cells, SheetField::Phone)),
        alt_phone: columns.optional(cells, SheetField::AltPhone).map(|p| normalize_phone(&p)),
        email: columns.optional(cells, SheetField::Email),
        address: columns.text(cells, SheetField::Address).to_string(),
        city: columns.text(cells, SheetField::City).to_string(),
        postal_code: columns.optional(cells, SheetField::PostalCode),
        product_name: columns.text(cells, SheetField::ProductName).to_string(),
        product_sku: columns.optional(cells, SheetField::ProductSku),
        quantity: parse_quantity(columns.text(cells, SheetField::Quantity)),
        variant: columns.optional(cells, SheetField::Variant),
        price: parse_price(columns.text(cells, SheetField::Price)),
        notes: columns.optional(cells, SheetField::Notes),
        status: columns.optional(cells, SheetField::Status),
        error: columns.optional(cells, SheetField::Error),
    })
}

/// Convert a block of cells whose first row is sheet row `first_row`.
pub fn parse_rows(
    grid: &[Vec<String>],
    first_row: u32,
    mapping: &ColumnMapping,
    today: NaiveDate,
) -> Result<SheetRead> {
    let columns = Columns::resolve(mapping)?;
    let mut read = SheetRead { mapping: mapping.clone(), ..SheetRead::default() };

    for (row_number, cells) in (first_row..).zip(grid) {
        if cells.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        match parse_row(row_number, cells, &columns, today) {
            Ok(order) => read.orders.push(order),
            Err(reason) => {
                warn!(row_number, %reason, "Skipping malformed sheet row");
                read.malformed.push(MalformedRow { row_number, reason });
            }
        }
    }
    Ok(read)
}

/// Reads orders from a spreadsheet through a [`SheetsClient`].
pub struct SheetReader {
    client: Arc<dyn SheetsClient>,
    policy: BackoffPolicy,
}

impl SheetReader {
    /// Reader with the default read retry policy.
    pub fn new(client: Arc<dyn SheetsClient>) -> Self {
        Self { client, policy: BackoffPolicy::default() }
    }

    /// Replace the read retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn read(&self, access_token: &str, spreadsheet_id: &str, range: &str) -> Result<CellGrid> {
        let client = Arc::clone(&self.client);
        retry_with_backoff(&self.policy, SheetsError::is_retryable, |attempt| {
            let client = Arc::clone(&client);
            async move {
                debug!(attempt, range, "Reading sheet range");
                client.read_range(access_token, spreadsheet_id, range).await
            }
        })
        .await
        .map_err(OrderLinkError::from)
    }

    /// Last non-empty row of column A at or after `from_row`, scanning from
    /// the bottom. `None` when the column is empty.
    pub async fn detect_end_row(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        sheet_name: &str,
        from_row: u32,
    ) -> Result<Option<u32>> {
        let range = format!("{}!A{from_row}:A", quoted_sheet(sheet_name));
        let column = self.read(access_token, spreadsheet_id, &range).await?;
        let last = column
            .iter()
            .rposition(|row| row.first().is_some_and(|cell| !cell.trim().is_empty()));
        Ok(last
            .and_then(|offset| u32::try_from(offset).ok())
            .map(|offset| from_row.saturating_add(offset)))
    }

    /// The sheet's configured mapping, or one detected from its header row.
    pub async fn resolve_mapping(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        sheet: &SheetConfig,
    ) -> Result<ColumnMapping> {
        if !sheet.mapping.is_empty() {
            return Ok(sheet.mapping.clone());
        }
        let range = format!("{}!{row}:{row}", quoted_sheet(&sheet.sheet_name), row = sheet.header_row);
        let header = self.read(access_token, spreadsheet_id, &range).await?;
        let mapping = detect_mapping(header.first().map_or(&[][..], Vec::as_slice));
        if mapping.is_empty() {
            return Err(OrderLinkError::InvalidInput(format!(
                "sheet '{}' has no column mapping and no recognisable header row",
                sheet.sheet_name
            )));
        }
        debug!(fields = mapping.iter().count(), "Detected column mapping from header row");
        Ok(mapping)
    }

    /// Read orders between `start_row` (default: the sheet's data start row)
    /// and `end_row` (default: last non-empty cell of column A).
    #[instrument(skip(self, access_token, sheet), fields(sheet = %sheet.sheet_name))]
    pub async fn read_orders(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        sheet: &SheetConfig,
        start_row: Option<u32>,
        end_row: Option<u32>,
        today: NaiveDate,
    ) -> Result<SheetRead> {
        let mapping = self.resolve_mapping(access_token, spreadsheet_id, sheet).await?;
        let start = start_row.unwrap_or(sheet.data_start_row).max(1);
        let end = match end_row {
            Some(end) => Some(end),
            None => self.detect_end_row(access_token, spreadsheet_id, &sheet.sheet_name, start).await?,
        };
        let Some(end) = end.filter(|end| *end >= start) else {
            debug!(start, "No data rows to read");
            return Ok(SheetRead { mapping, ..SheetRead::default() });
        };

        let last_column = column_letter(Columns::resolve(&mapping)?.last_index());
        let range = a1_range(&sheet.sheet_name, "A", start, &last_column, end);
        let grid = self.read(access_token, spreadsheet_id, &range).await?;
        let read = parse_rows(&grid, start, &mapping, today)?;
        debug!(
            start,
            end,
            orders = read.orders.len(),
            malformed = read.malformed.len(),
            "Read sheet rows"
        );
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    fn mapping() -> ColumnMapping {
        ColumnMapping::new()
            .with(SheetField::Date, "A")
            .with(SheetField::CustomerName, "B")
            .with(SheetField::Phone, "C")
            .with(SheetField::Address, "D")
            .with(SheetField::City, "E")
            .with(SheetField::ProductName, "F")
            .with(SheetField::Price, "G")
            .with(SheetField::Quantity, "H")
            .with(SheetField::Reference, "I")
    }

    #[test]
    fn column_letters_are_base_26() {
        assert_eq!(column_index("A").unwrap(), 0);
        assert_eq!(column_index("Z").unwrap(), 25);
        assert_eq!(column_index("AA").unwrap(), 26);
        assert_eq!(column_index("az").unwrap(), 51);
        assert_eq!(column_index("ZZ").unwrap(), 701);
        assert!(column_index("").is_err());
        assert!(column_index("A1").is_err());
    }

    #[test]
    fn column_letter_inverts_index() {
        for index in [0, 25, 26, 51, 52, 701, 702, 16383] {
            assert_eq!(column_index(&column_letter(index)).unwrap(), index);
        }
        assert_eq!(column_letter(26), "AA");
    }

    #[test]
    fn ranges_quote_sheet_names() {
        assert_eq!(a1_range("Sheet1", "A", 2, "H", 40), "Sheet1!A2:H40");
        assert_eq!(a1_range("Orders May", "A", 2, "C", 3), "'Orders May'!A2:C3");
        assert_eq!(cell_ref("Bob's", "I", 5), "'Bob''s'!I5");
    }

    #[test]
    fn prices_parse_permissively() {
        assert!((parse_price("199 MAD") - 199.0).abs() < f64::EPSILON);
        assert!((parse_price("1 250,50 DH") - 1250.5).abs() < f64::EPSILON);
        assert!((parse_price("$1,250.50") - 1250.5).abs() < f64::EPSILON);
        assert!((parse_price("1.250,50") - 1250.5).abs() < f64::EPSILON);
        assert!((parse_price("45,50") - 45.5).abs() < f64::EPSILON);
        assert!((parse_price("1.250.000 DH") - 1_250_000.0).abs() < f64::EPSILON);
        assert!(parse_price("free").abs() < f64::EPSILON);
    }

    #[test]
    fn quantities_default_to_one() {
        assert_eq!(parse_quantity(""), 1);
        assert_eq!(parse_quantity("x"), 1);
        assert_eq!(parse_quantity("3 pcs"), 3);
        assert_eq!(parse_quantity("2.0"), 2);
        assert_eq!(parse_quantity("0"), 0);
    }

    #[test]
    fn dates_in_common_formats() {
        let expected = day(2024, 1, 10);
        for raw in ["2024-01-10", "10/01/2024", "10-01-2024", "2024/01/10", "10/01/2024 14:30", "2024-01-10T09:00:00Z"] {
            assert_eq!(parse_date(raw), Some(expected), "{raw}");
        }
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn blank_rows_skipped_and_malformed_reported() {
        let grid = vec![
            cells(&["2024-01-10", "Ahmed Ali", "06 12 34 56 78", "12 Rue X", "Casablanca", "Widget", "100", "", ""]),
            cells(&["", " ", ""]),
            cells(&["not a date", "Sara", "0600000000"]),
            cells(&["", "Youssef", "0611111111", "Av Y", "Rabat", "Gadget", "50 DH", "2", "GS202401100001"]),
        ];
        let read = parse_rows(&grid, 2, &mapping(), day(2024, 2, 1)).unwrap();

        assert_eq!(read.orders.len(), 2);
        assert_eq!(read.malformed, vec![MalformedRow { row_number: 4, reason: "unrecognised date 'not a date'".into() }]);

        let first = &read.orders[0];
        assert_eq!(first.row_number, 2);
        assert_eq!(first.phone, "0612345678");
        assert_eq!(first.quantity, 1);
        assert!(first.reference.is_none());

        let last = &read.orders[1];
        assert_eq!(last.row_number, 5);
        assert_eq!(last.order_date, day(2024, 2, 1));
        assert_eq!(last.quantity, 2);
        assert!(last.has_system_reference());
    }

    #[test]
    fn ragged_rows_read_missing_cells_as_empty() {
        let grid = vec![cells(&["2024-01-10", "Ahmed"])];
        let read = parse_rows(&grid, 2, &mapping(), day(2024, 1, 10)).unwrap();
        assert_eq!(read.orders[0].city, "");
        assert!(read.orders[0].price.abs() < f64::EPSILON);
    }
}
