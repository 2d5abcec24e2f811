//! Similarity scoring between a sheet row and a stored order
//!
//! Two scorers:
//! - [`weighted_match`]: field-by-field exact/partial comparison, used when
//!   the phone number already matched (same-day and extended windows)
//! - [`fuzzy_match`]: normalized edit distance on name, address and
//!   product, used for same-day candidates found without a phone match
//!
//! Both return a score in `[0, 1]`.

use orderlink_domain::constants::{ADDRESS_PREFIX_LEN, FUZZY_MATCH_THRESHOLD, PRICE_TOLERANCE};
use orderlink_domain::{ExistingOrder, SheetOrder};
use strsim::normalized_levenshtein;

use crate::utils::text::{fold, folded_prefix, non_blank, normalize_phone};

const PHONE_WEIGHT: f64 = 3.0;
const NAME_WEIGHT: f64 = 2.0;
const ADDRESS_WEIGHT: f64 = 2.0;
const PRODUCT_WEIGHT: f64 = 2.0;
const PRICE_WEIGHT: f64 = 1.0;

const FUZZY_NAME_WEIGHT: f64 = 3.0;
const FUZZY_ADDRESS_WEIGHT: f64 = 2.0;
const FUZZY_PRODUCT_WEIGHT: f64 = 2.0;

/// Score plus the fields that did not fully match.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchScore {
    /// Weighted similarity in `0.0..=1.0`.
    pub score: f64,
    /// Fields that did not match.
    pub conflicting_fields: Vec<String>,
}

#[derive(Default)]
struct Tally {
    achieved: f64,
    applicable: f64,
    conflicts: Vec<String>,
}

impl Tally {
    fn add(&mut self, field: &str, weight: f64, earned: f64) {
        self.applicable += weight;
        self.achieved += earned;
        if earned < weight {
            self.conflicts.push(field.to_string());
        }
    }

    fn finish(self) -> MatchScore {
        let score = if self.applicable > 0.0 { self.achieved / self.applicable } else { 0.0 };
        MatchScore { score: score.clamp(0.0, 1.0), conflicting_fields: self.conflicts }
    }
}

fn name_points(candidate: &str, existing: &str) -> f64 {
    let (a, b) = (fold(candidate), fold(existing));
    if a == b {
        NAME_WEIGHT
    } else if a.contains(&b) || b.contains(&a) || a.split(' ').next() == b.split(' ').next() {
        NAME_WEIGHT / 2.0
    } else {
        0.0
    }
}

fn address_points(candidate: &str, existing: &str) -> f64 {
    if fold(candidate) == fold(existing) {
        ADDRESS_WEIGHT
    } else if folded_prefix(candidate, ADDRESS_PREFIX_LEN) == folded_prefix(existing, ADDRESS_PREFIX_LEN) {
        ADDRESS_WEIGHT / 2.0
    } else {
        0.0
    }
}

/// Row total as it would be stored on the order.
#[must_use]
pub fn row_total(order: &SheetOrder) -> f64 {
    order.price * f64::from(order.quantity.max(1))
}

/// Weighted exact/partial comparison: phone 3, name 2, address 2, product
/// (SKU or name) 2, price 1. Fields blank on either side are left out of the
/// denominator; price always applies.
#[must_use]
pub fn weighted_match(candidate: &SheetOrder, existing: &ExistingOrder) -> MatchScore {
    let mut tally = Tally::default();

    if let (Some(a), Some(b)) = (non_blank(&candidate.phone), non_blank(&existing.phone)) {
        let earned = if normalize_phone(a) == normalize_phone(b) { PHONE_WEIGHT } else { 0.0 };
        tally.add("phone", PHONE_WEIGHT, earned);
    }

    if let (Some(a), Some(b)) = (non_blank(&candidate.customer_name), non_blank(&existing.customer_name)) {
        tally.add("customer_name", NAME_WEIGHT, name_points(a, b));
    }

    if let (Some(a), Some(b)) = (non_blank(&candidate.address), existing.address.as_deref().and_then(non_blank)) {
        tally.add("address", ADDRESS_WEIGHT, address_points(a, b));
    }

    let sku_pair = candidate.product_sku.as_deref().and_then(non_blank).zip(existing.product_sku.as_deref().and_then(non_blank));
    let name_pair = non_blank(&candidate.product_name).zip(existing.product_name.as_deref().and_then(non_blank));
    if sku_pair.is_some() || name_pair.is_some() {
        let sku_match = sku_pair.is_some_and(|(a, b)| a.eq_ignore_ascii_case(b));
        let name_match = name_pair.is_some_and(|(a, b)| fold(a) == fold(b));
        let earned = if sku_match || name_match { PRODUCT_WEIGHT } else { 0.0 };
        tally.add("product", PRODUCT_WEIGHT, earned);
    }

    let price_match = (row_total(candidate) - existing.total_amount).abs() < PRICE_TOLERANCE;
    tally.add("price", PRICE_WEIGHT, if price_match { PRICE_WEIGHT } else { 0.0 });

    tally.finish()
}

/// Edit-distance similarity: name 3, address 2, product 2, over a fixed
/// total of 7.
#[must_use]
pub fn fuzzy_match(candidate: &SheetOrder, existing: &ExistingOrder) -> MatchScore {
    let pairs = [
        ("customer_name", FUZZY_NAME_WEIGHT, candidate.customer_name.as_str(), existing.customer_name.as_str()),
        ("address", FUZZY_ADDRESS_WEIGHT, candidate.address.as_str(), existing.address.as_deref().unwrap_or("")),
        ("product", FUZZY_PRODUCT_WEIGHT, candidate.product_name.as_str(), existing.product_name.as_deref().unwrap_or("")),
    ];

    let total: f64 = pairs.iter().map(|(_, weight, _, _)| weight).sum();
    let mut achieved = 0.0;
    let mut conflicting_fields = Vec::new();
    for (field, weight, a, b) in pairs {
        let similarity = normalized_levenshtein(&fold(a), &fold(b));
        if similarity < FUZZY_MATCH_THRESHOLD {
            conflicting_fields.push(field.to_string());
        }
        achieved += weight * similarity;
    }

    MatchScore { score: (achieved / total).clamp(0.0, 1.0), conflicting_fields }
}
