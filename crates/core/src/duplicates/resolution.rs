//! What to do with a row given its duplicate detection result

use orderlink_domain::constants::{EXACT_MATCH_THRESHOLD, FLAG_HIGH_THRESHOLD, SIMILAR_MATCH_THRESHOLD};
use orderlink_domain::{DuplicateDetectionResult, DuplicateTier, DuplicateType};

/// Action taken for a row.
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateResolution {
    /// No duplicate worth acting on.
    Create,
    /// Already imported; nothing is written.
    Skip { existing_order_number: String, score: f64 },
    /// Created, but flagged for review with `note`.
    CreateFlagged { note: String },
}

fn tier_label(tier: Option<DuplicateTier>) -> &'static str {
    tier.as_ref().map_or("unknown", DuplicateTier::as_str)
}

impl DuplicateResolution {
    /// Exact and `>= 0.95` skips; `>= 0.7` creates flagged; anything lower
    /// creates normally.
    #[must_use]
    pub fn from_detection(result: &DuplicateDetectionResult) -> Self {
        let Some(existing) = result.existing_order.as_ref().filter(|_| result.is_duplicate) else {
            return Self::Create;
        };
        let score = result.similarity_score;

        if result.duplicate_type == DuplicateType::Exact && score >= EXACT_MATCH_THRESHOLD {
            return Self::Skip { existing_order_number: existing.order_number.clone(), score };
        }
        if score < SIMILAR_MATCH_THRESHOLD {
            tracing::debug!(
                order_number = %existing.order_number,
                score,
                "Weak duplicate match ignored"
            );
            return Self::Create;
        }

        let strength = if score >= FLAG_HIGH_THRESHOLD { "Likely" } else { "Possible" };
        let mut note = format!(
            "{strength} duplicate of order {} (score {score:.2}, {} match)",
            existing.order_number,
            tier_label(result.tier)
        );
        if !result.conflicting_fields.is_empty() {
            note.push_str("; differs in: ");
            note.push_str(&result.conflicting_fields.join(", "));
        }
        Self::CreateFlagged { note }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use orderlink_domain::ExistingOrder;

    use super::*;

    fn detection(duplicate_type: DuplicateType, score: f64, conflicts: &[&str]) -> DuplicateDetectionResult {
        DuplicateDetectionResult {
            is_duplicate: true,
            duplicate_type,
            existing_order: Some(ExistingOrder {
                order_id: "o1".into(),
                order_number: "GS202401100003".into(),
                order_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
                customer_name: "Ahmed Ali".into(),
                phone: "0612345678".into(),
                address: None,
                city: None,
                product_name: None,
                product_sku: None,
                total_amount: 100.0,
                created_at: Utc::now(),
            }),
            similarity_score: score,
            conflicting_fields: conflicts.iter().map(ToString::to_string).collect(),
            tier: Some(DuplicateTier::ExtendedWindow),
        }
    }

    #[test]
    fn no_duplicate_creates() {
        assert_eq!(DuplicateResolution::from_detection(&DuplicateDetectionResult::none()), DuplicateResolution::Create);
    }

    #[test]
    fn exact_match_skips() {
        let resolution = DuplicateResolution::from_detection(&detection(DuplicateType::Exact, 1.0, &[]));
        assert_eq!(
            resolution,
            DuplicateResolution::Skip { existing_order_number: "GS202401100003".into(), score: 1.0 }
        );
    }

    #[test]
    fn similar_matches_are_flagged_with_context() {
        let DuplicateResolution::CreateFlagged { note } =
            DuplicateResolution::from_detection(&detection(DuplicateType::Similar, 0.9, &["address"]))
        else {
            panic!("expected flagged resolution");
        };
        assert!(note.starts_with("Likely duplicate of order GS202401100003"));
        assert!(note.contains("extended_window"));
        assert!(note.ends_with("differs in: address"));

        let DuplicateResolution::CreateFlagged { note } =
            DuplicateResolution::from_detection(&detection(DuplicateType::Similar, 0.75, &[]))
        else {
            panic!("expected flagged resolution");
        };
        assert!(note.starts_with("Possible duplicate"));
    }

    #[test]
    fn weak_matches_create_normally() {
        assert_eq!(
            DuplicateResolution::from_detection(&detection(DuplicateType::Similar, 0.5, &["phone"])),
            DuplicateResolution::Create
        );
    }
}
