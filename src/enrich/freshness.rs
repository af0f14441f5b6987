//! Freshness Scoring
//!
//! Derives a [0, 1] score for how "new and alive" a listing looks. The age
//! component decays exponentially with a configurable half-life, so the
//! score is monotone non-increasing in age; evidence and market components
//! reward corroborated data.

use crate::domain::candidate::TokenCandidate;

/// Component weights. Defaults sum to 1.0 so the final score stays inside
/// [0, 1] without renormalization.
#[derive(Debug, Clone)]
pub struct FreshnessWeights {
    pub age_weight: f64,
    pub onchain_weight: f64,
    pub market_weight: f64,
    /// Age at which the age component halves, in seconds.
    pub half_life_secs: f64,
}

impl Default for FreshnessWeights {
    fn default() -> Self {
        Self {
            age_weight: 0.6,
            onchain_weight: 0.25,
            market_weight: 0.15,
            half_life_secs: 1800.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FreshnessScorer {
    weights: FreshnessWeights,
}

impl FreshnessScorer {
    pub fn new(weights: FreshnessWeights) -> Self {
        Self { weights }
    }

    /// Score from raw inputs. Unknown age contributes zero, it is not
    /// treated as brand new.
    pub fn score(
        &self,
        age_seconds: Option<f64>,
        has_onchain_evidence: bool,
        liquidity_usd: Option<f64>,
        volume_usd: Option<f64>,
    ) -> f64 {
        let w = &self.weights;

        let age_component = match age_seconds {
            Some(age) => 0.5f64.powf(age.max(0.0) / w.half_life_secs),
            None => 0.0,
        };
        let onchain_component = if has_onchain_evidence { 1.0 } else { 0.0 };
        let liquid = liquidity_usd.is_some_and(|v| v > 0.0);
        let traded = volume_usd.is_some_and(|v| v > 0.0);
        let market_component =
            0.5 * (liquid as u8 as f64) + 0.5 * (traded as u8 as f64);

        (w.age_weight * age_component
            + w.onchain_weight * onchain_component
            + w.market_weight * market_component)
            .clamp(0.0, 1.0)
    }

    pub fn score_candidate(&self, candidate: &TokenCandidate) -> f64 {
        self.score(
            candidate.age_seconds,
            candidate.has_onchain_evidence(),
            candidate.liquidity_usd,
            candidate.volume_usd,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_score_stays_in_unit_interval() {
        let scorer = FreshnessScorer::default();
        assert_eq!(scorer.score(Some(0.0), true, Some(1000.0), Some(1000.0)), 1.0);
        assert_eq!(scorer.score(None, false, None, None), 0.0);
    }

    #[test]
    fn test_monotone_non_increasing_in_age() {
        let scorer = FreshnessScorer::default();
        let mut prev = f64::INFINITY;
        for age in [0.0, 30.0, 300.0, 1800.0, 7200.0, 86400.0] {
            let score = scorer.score(Some(age), false, None, None);
            assert!(score <= prev, "score rose at age {age}");
            prev = score;
        }
    }

    #[test]
    fn test_half_life_halves_age_component() {
        let scorer = FreshnessScorer::default();
        let at_zero = scorer.score(Some(0.0), false, None, None);
        let at_half_life = scorer.score(Some(1800.0), false, None, None);
        assert_relative_eq!(at_half_life, at_zero / 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unknown_age_scores_below_brand_new() {
        let scorer = FreshnessScorer::default();
        let unknown = scorer.score(None, true, Some(100.0), Some(100.0));
        let brand_new = scorer.score(Some(0.0), true, Some(100.0), Some(100.0));
        assert!(unknown < brand_new);
    }

    #[test]
    fn test_market_component_requires_positive_values() {
        let scorer = FreshnessScorer::default();
        let zeroed = scorer.score(None, false, Some(0.0), Some(0.0));
        let live = scorer.score(None, false, Some(50.0), Some(50.0));
        assert_eq!(zeroed, 0.0);
        assert_relative_eq!(live, 0.15);
    }
}
