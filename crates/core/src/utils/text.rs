//! Normalization of free-text sheet values
//!
//! Sheets are filled by hand, so values are compared after folding case,
//! accents and separators.
//!
//! ```
//! use orderlink_core::utils::text::{fold, normalize_phone};
//!
//! assert_eq!(fold("  Rue  de l'Épée "), "rue de l epee");
//! assert_eq!(normalize_phone("06 12-34.56 (78)"), "0612345678");
//! ```

use unicode_normalization::UnicodeNormalization;

/// Lowercase, strip accents, turn punctuation into spaces and collapse
/// whitespace.
#[must_use]
pub fn fold(value: &str) -> String {
    let mut stripped = String::with_capacity(value.len());
    for c in value.nfd().filter(|c| !unicode_normalization::char::is_combining_mark(*c)) {
        if c.is_alphanumeric() {
            stripped.extend(c.to_lowercase());
        } else {
            stripped.push(' ');
        }
    }
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove spaces, dots, dashes and parentheses from a phone number.
#[must_use]
pub fn normalize_phone(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, ' ' | '.' | '-' | '(' | ')' | '\u{a0}')).collect()
}

/// First `len` characters of the folded value.
#[must_use]
pub fn folded_prefix(value: &str, len: usize) -> String {
    fold(value).chars().take(len).collect()
}

/// `None` for blank strings, trimmed value otherwise.
#[must_use]
pub fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
