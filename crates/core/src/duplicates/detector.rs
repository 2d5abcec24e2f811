//! Three-tier duplicate detection
//!
//! Tiers run in order and the first match wins:
//! 1. same phone, same calendar day (always reported, classified by score)
//! 2. same phone within `[-7, +1]` days, best match scoring at least 0.7
//! 3. same day, matched by first name or address prefix, scored by edit
//!    distance, best match scoring at least 0.8

use std::sync::Arc;

use chrono::Duration;
use orderlink_domain::constants::{
    ADDRESS_PREFIX_LEN, EXACT_MATCH_THRESHOLD, EXTENDED_WINDOW_DAYS_AFTER, EXTENDED_WINDOW_DAYS_BEFORE,
    EXTENDED_WINDOW_LIMIT, FUZZY_CANDIDATE_LIMIT, FUZZY_MATCH_THRESHOLD, SIMILAR_MATCH_THRESHOLD,
};
use orderlink_domain::{
    DuplicateDetectionResult, DuplicateTier, DuplicateType, ExistingOrder, Result, SheetOrder,
};
use tracing::{debug, instrument};

use super::ports::OrderLookup;
use super::scoring::{fuzzy_match, weighted_match, MatchScore};
use crate::utils::text::non_blank;

fn best_match<F>(candidates: Vec<ExistingOrder>, score: F) -> Option<(ExistingOrder, MatchScore)>
where
    F: Fn(&ExistingOrder) -> MatchScore,
{
    candidates
        .into_iter()
        .map(|existing| {
            let scored = score(&existing);
            (existing, scored)
        })
        .fold(None, |best: Option<(ExistingOrder, MatchScore)>, current| match best {
            Some(best) if best.1.score >= current.1.score => Some(best),
            _ => Some(current),
        })
}

fn classify(score: f64) -> DuplicateType {
    if score >= EXACT_MATCH_THRESHOLD {
        DuplicateType::Exact
    } else {
        DuplicateType::Similar
    }
}

fn found(
    existing: ExistingOrder,
    scored: MatchScore,
    duplicate_type: DuplicateType,
    tier: DuplicateTier,
) -> DuplicateDetectionResult {
    DuplicateDetectionResult {
        is_duplicate: true,
        duplicate_type,
        existing_order: Some(existing),
        similarity_score: scored.score,
        conflicting_fields: scored.conflicting_fields,
        tier: Some(tier),
    }
}

/// Looks for an existing order matching a sheet row.
pub struct DuplicateDetector {
    lookup: Arc<dyn OrderLookup>,
}

impl DuplicateDetector {
    /// Detector over `lookup`.
    pub fn new(lookup: Arc<dyn OrderLookup>) -> Self {
        Self { lookup }
    }

    /// Run the tiers for `order` within `organization_id`.
    #[instrument(skip(self, order), fields(row = order.row_number))]
    pub async fn detect(&self, organization_id: &str, order: &SheetOrder) -> Result<DuplicateDetectionResult> {
        let day = order.order_date;

        if let Some(phone) = non_blank(&order.phone) {
            let same_day = self
                .lookup
                .find_by_phone_between(organization_id, phone, day, day, EXTENDED_WINDOW_LIMIT)
                .await?;
            if let Some((existing, scored)) = best_match(same_day, |e| weighted_match(order, e)) {
                debug!(order_number = %existing.order_number, score = scored.score, "Same-day match");
                let duplicate_type = classify(scored.score);
                return Ok(found(existing, scored, duplicate_type, DuplicateTier::SameDay));
            }

            let window = self
                .lookup
                .find_by_phone_between(
                    organization_id,
                    phone,
                    day - Duration::days(EXTENDED_WINDOW_DAYS_BEFORE),
                    day + Duration::days(EXTENDED_WINDOW_DAYS_AFTER),
                    EXTENDED_WINDOW_LIMIT,
                )
                .await?;
            if let Some((existing, scored)) = best_match(window, |e| weighted_match(order, e))
                .filter(|(_, scored)| scored.score >= SIMILAR_MATCH_THRESHOLD)
            {
                debug!(order_number = %existing.order_number, score = scored.score, "Extended-window match");
                let duplicate_type = classify(scored.score);
                return Ok(found(existing, scored, duplicate_type, DuplicateTier::ExtendedWindow));
            }
        }

        let first_name = order.first_name().and_then(non_blank);
        let address_prefix: Option<String> =
            non_blank(&order.address).map(|address| address.chars().take(ADDRESS_PREFIX_LEN).collect());
        if first_name.is_none() && address_prefix.is_none() {
            return Ok(DuplicateDetectionResult::none());
        }

        let candidates = self
            .lookup
            .find_same_day_candidates(
                organization_id,
                day,
                first_name,
                address_prefix.as_deref(),
                FUZZY_CANDIDATE_LIMIT,
            )
            .await?;
        if let Some((existing, scored)) = best_match(candidates, |e| fuzzy_match(order, e))
            .filter(|(_, scored)| scored.score >= FUZZY_MATCH_THRESHOLD)
        {
            debug!(order_number = %existing.order_number, score = scored.score, "Fuzzy match");
            return Ok(found(existing, scored, DuplicateType::Similar, DuplicateTier::Fuzzy));
        }

        Ok(DuplicateDetectionResult::none())
    }
}
