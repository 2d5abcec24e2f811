//! Required-field and format checks for sheet rows

use orderlink_domain::{OrderLinkError, Result, SheetField, SheetOrder, SyncError, SyncErrorCategory, ValidationRules};
use regex::Regex;

use crate::utils::text::{non_blank, normalize_phone};

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Offending field.
    pub field: SheetField,
    /// What is wrong.
    pub message: String,
    /// How to fix it in the sheet.
    pub suggested_fix: String,
}

impl ValidationIssue {
    fn new(field: SheetField, message: impl Into<String>, suggested_fix: impl Into<String>) -> Self {
        Self { field, message: message.into(), suggested_fix: suggested_fix.into() }
    }
}

fn has_value(row: &SheetOrder, field: SheetField) -> bool {
    let text = match field {
        SheetField::Reference => row.reference.as_deref(),
        SheetField::Date => return true,
        SheetField::CustomerName => Some(row.customer_name.as_str()),
        SheetField::Phone => Some(row.phone.as_str()),
        SheetField::AltPhone => row.alt_phone.as_deref(),
        SheetField::Email => row.email.as_deref(),
        SheetField::Address => Some(row.address.as_str()),
        SheetField::City => Some(row.city.as_str()),
        SheetField::PostalCode => row.postal_code.as_deref(),
        SheetField::ProductName => Some(row.product_name.as_str()),
        SheetField::ProductSku => row.product_sku.as_deref(),
        SheetField::Quantity => return row.quantity > 0,
        SheetField::Variant => row.variant.as_deref(),
        SheetField::Price => return row.price > 0.0,
        SheetField::Notes => row.notes.as_deref(),
        SheetField::Status => row.status.as_deref(),
        SheetField::Error => row.error.as_deref(),
    };
    text.and_then(non_blank).is_some()
}

/// Checks rows against the configured [`ValidationRules`].
#[derive(Debug, Clone)]
pub struct RowValidator {
    phone_pattern: Regex,
    required_fields: Vec<SheetField>,
}

impl RowValidator {
    /// Fails with `Config` when the phone pattern is not a valid regex.
    pub fn new(rules: &ValidationRules) -> Result<Self> {
        let phone_pattern = Regex::new(&rules.phone_pattern)
            .map_err(|e| OrderLinkError::Config(format!("invalid validation.phone_pattern: {e}")))?;
        Ok(Self { phone_pattern, required_fields: rules.required_fields.clone() })
    }

    /// All failed checks for `row`; empty when the row is valid.
    #[must_use]
    pub fn validate(&self, row: &SheetOrder) -> Vec<ValidationIssue> {
        let mut issues: Vec<ValidationIssue> = self
            .required_fields
            .iter()
            .filter(|field| !matches!(field, SheetField::Price | SheetField::Quantity))
            .filter(|field| !has_value(row, **field))
            .map(|field| {
                ValidationIssue::new(
                    *field,
                    format!("{field} is required"),
                    format!("Fill in the {} column", field.as_str().replace('_', " ")),
                )
            })
            .collect();

        if let Some(phone) = non_blank(&row.phone) {
            if !self.phone_pattern.is_match(&normalize_phone(phone)) {
                issues.push(ValidationIssue::new(
                    SheetField::Phone,
                    format!("phone '{phone}' has an invalid format"),
                    "Use 9 to 15 digits, optionally starting with +",
                ));
            }
        }
        if row.price <= 0.0 {
            issues.push(ValidationIssue::new(
                SheetField::Price,
                "price must be greater than 0",
                "Enter the order total as a positive number",
            ));
        }
        if row.quantity < 1 {
            issues.push(ValidationIssue::new(SheetField::Quantity, "quantity must be at least 1", "Enter a quantity of 1 or more"));
        }
        issues
    }

    /// Fold a row's issues into one `validation` [`SyncError`].
    #[must_use]
    pub fn to_sync_error(row: &SheetOrder, issues: &[ValidationIssue]) -> SyncError {
        let message = issues.iter().map(|issue| issue.message.as_str()).collect::<Vec<_>>().join("; ");
        let fix = issues.iter().map(|issue| issue.suggested_fix.as_str()).collect::<Vec<_>>().join("; ");
        let error = SyncError::new(row.row_number, SyncErrorCategory::Validation, message).with_suggested_fix(fix);
        match serde_json::to_value(row) {
            Ok(row_data) => error.with_row_data(row_data),
            Err(_) => error,
        }
    }
}
