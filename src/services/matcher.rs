//! Fuzzy matching of free-text ingredient names against a store's
//! inventory.
//!
//! Matching is a heuristic, not a guarantee: an accepted match means
//! "likely correct". Callers that mutate mappings based on a match must
//! log the decision; `best_match` emits the audit line with the inputs,
//! score, and chosen candidate so the repair trail is reconstructable.

use strsim::normalized_levenshtein;
use tracing::{debug, info};

use crate::entities::inventory_item;
use crate::services::normalize::{normalize_name, normalize_unit, units_compatible};

/// Default acceptance threshold for interactive suggestions.
pub const INTERACTIVE_ACCEPT_THRESHOLD: f64 = 0.6;
/// Default acceptance threshold for automated bulk repair.
pub const BULK_ACCEPT_THRESHOLD: f64 = 0.8;

const NEAR_EXACT_SIMILARITY: f64 = 0.9;
const NEAR_EXACT_BONUS: f64 = 0.05;
const EXACT_BONUS: f64 = 0.05;
const UNIT_BONUS: f64 = 0.05;

/// How strict the acceptance threshold is for a given call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Looser; results are suggestions a human confirms.
    Interactive,
    /// Stricter; results drive automated mutation.
    Bulk,
}

impl MatchPolicy {
    pub fn default_threshold(&self) -> f64 {
        match self {
            MatchPolicy::Interactive => INTERACTIVE_ACCEPT_THRESHOLD,
            MatchPolicy::Bulk => BULK_ACCEPT_THRESHOLD,
        }
    }
}

/// An accepted match and its combined score in [0, 1].
#[derive(Clone, Debug)]
pub struct MatchCandidate {
    pub item: inventory_item::Model,
    pub score: f64,
}

/// Scores one candidate against the normalized target name.
fn score_candidate(
    target_norm: &str,
    unit: Option<&str>,
    candidate: &inventory_item::Model,
) -> f64 {
    let candidate_norm = normalize_name(&candidate.name);
    let similarity = normalized_levenshtein(target_norm, &candidate_norm);

    let mut score = similarity;
    if similarity > NEAR_EXACT_SIMILARITY {
        score += NEAR_EXACT_BONUS;
    }
    if target_norm == candidate_norm {
        score += EXACT_BONUS;
    }
    if let Some(unit) = unit {
        if units_compatible(unit, &candidate.unit) {
            score += UNIT_BONUS;
        }
    }
    score.min(1.0)
}

/// Finds the best-scoring active candidate for an ingredient name,
/// rejecting anything below the policy's acceptance threshold.
///
/// Deterministic: the same inputs always produce the same output, and
/// ties go to the first candidate encountered at the maximum score.
pub fn best_match(
    ingredient_name: &str,
    unit: Option<&str>,
    candidates: &[inventory_item::Model],
    policy: MatchPolicy,
) -> Option<MatchCandidate> {
    best_match_with_threshold(ingredient_name, unit, candidates, policy.default_threshold())
}

/// `best_match` with an explicit threshold, for config-overridden call
/// sites.
pub fn best_match_with_threshold(
    ingredient_name: &str,
    unit: Option<&str>,
    candidates: &[inventory_item::Model],
    threshold: f64,
) -> Option<MatchCandidate> {
    let target_norm = normalize_name(ingredient_name);
    let unit_norm = unit.map(normalize_unit);

    let mut best: Option<MatchCandidate> = None;
    for candidate in candidates {
        if !candidate.active {
            continue;
        }
        let score = score_candidate(&target_norm, unit_norm.as_deref(), candidate);
        let is_better = match &best {
            Some(current) => score > current.score,
            None => true,
        };
        if is_better {
            best = Some(MatchCandidate {
                item: candidate.clone(),
                score,
            });
        }
    }

    match best {
        Some(candidate) if candidate.score >= threshold => {
            info!(
                ingredient = %ingredient_name,
                unit = ?unit,
                candidate_id = %candidate.item.id,
                candidate_name = %candidate.item.name,
                score = candidate.score,
                threshold = threshold,
                "Accepted inventory match"
            );
            Some(candidate)
        }
        Some(candidate) => {
            debug!(
                ingredient = %ingredient_name,
                best_score = candidate.score,
                threshold = threshold,
                "Best match below acceptance threshold"
            );
            None
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn item(name: &str, unit: &str) -> inventory_item::Model {
        inventory_item::Model {
            id: Uuid::new_v4(),
            store_id: Uuid::new_v4(),
            name: name.to_string(),
            unit: unit.to_string(),
            quantity: dec!(10),
            minimum_threshold: dec!(1),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn case_insensitive_exact_match_scores_high() {
        let candidates = vec![item("Regular Croissant", "pieces")];
        let result = best_match(
            "REGULAR CROISSANT",
            Some("pcs"),
            &candidates,
            MatchPolicy::Bulk,
        )
        .expect("exact match should be accepted");
        assert!(result.score >= 0.9);
        assert_eq!(result.item.name, "Regular Croissant");
    }

    #[test]
    fn below_threshold_is_rejected() {
        let candidates = vec![item("Vanilla Syrup", "ml")];
        assert!(best_match("Espresso Beans", Some("g"), &candidates, MatchPolicy::Bulk).is_none());
    }

    #[test]
    fn bulk_is_stricter_than_interactive() {
        let candidates = vec![item("Chocolate Syrup", "ml")];
        let interactive =
            best_match("Choco Syrup", Some("ml"), &candidates, MatchPolicy::Interactive);
        assert!(interactive.is_some());
        // The same pair may or may not clear bulk; the invariant is that
        // anything clearing bulk also clears interactive.
        if let Some(bulk) = best_match("Choco Syrup", Some("ml"), &candidates, MatchPolicy::Bulk) {
            assert!(bulk.score >= interactive.unwrap().score - f64::EPSILON);
        }
    }

    #[test]
    fn inactive_candidates_are_skipped() {
        let mut inactive = item("Whipped Cream", "serving");
        inactive.active = false;
        let candidates = vec![inactive];
        assert!(best_match("Whipped Cream", None, &candidates, MatchPolicy::Bulk).is_none());
    }

    #[test]
    fn first_candidate_wins_ties() {
        let first = item("Whole Milk", "liters");
        let second = item("Whole Milk", "liters");
        let candidates = vec![first.clone(), second];
        let result = best_match("Whole Milk", Some("l"), &candidates, MatchPolicy::Bulk)
            .expect("exact duplicate should match");
        assert_eq!(result.item.id, first.id);
    }

    #[test]
    fn matching_is_deterministic() {
        let candidates = vec![item("Butter Croissant", "pieces"), item("Butter", "g")];
        let a = best_match("Buter Croissant", Some("pc"), &candidates, MatchPolicy::Interactive);
        let b = best_match("Buter Croissant", Some("pc"), &candidates, MatchPolicy::Interactive);
        match (a, b) {
            (Some(x), Some(y)) => {
                assert_eq!(x.item.id, y.item.id);
                assert_eq!(x.score, y.score);
            }
            (None, None) => {}
            _ => panic!("matcher must be deterministic"),
        }
    }

    #[test]
    fn unit_compatibility_breaks_near_ties() {
        let compatible = item("Heavy Cream", "ml");
        let incompatible = item("Heavy Cream", "g");
        // Compatible-unit candidate listed second still wins on score.
        // The target is near-exact rather than exact so the unit bonus
        // is not absorbed by the score clamp.
        let candidates = vec![incompatible, compatible.clone()];
        let result = best_match("Heavy Creme", Some("liters"), &candidates, MatchPolicy::Bulk)
            .expect("match expected");
        assert_eq!(result.item.id, compatible.id);
    }
}
