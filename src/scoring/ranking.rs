// =============================================================================
// Ranking — threshold filter plus stable descending sort by alpha
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scoring::scorer::Opportunity;

/// Both ranked lists of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedOpportunities {
    /// Entities whose expected return exceeds the threshold.
    pub opportunities: Vec<Opportunity>,
    /// Every scored entity.
    pub all_evaluations: Vec<Opportunity>,
    pub threshold_pct: f64,
    pub timestamp: DateTime<Utc>,
}

/// Sort `candidates` by alpha score (descending) and split off those whose
/// expected return is strictly above `threshold_pct`.
///
/// The sort is stable, so equal scores keep their input order.
pub fn rank(candidates: Vec<Opportunity>, threshold_pct: f64) -> RankedOpportunities {
    let mut all_evaluations = candidates;
    all_evaluations.sort_by(|a, b| b.alpha_score.total_cmp(&a.alpha_score));

    let opportunities = all_evaluations
        .iter()
        .filter(|o| o.expected_return_pct > threshold_pct)
        .cloned()
        .collect();

    RankedOpportunities {
        opportunities,
        all_evaluations,
        threshold_pct,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Confidence, RiskLevel};

    fn opp(name: &str, alpha: f64, expected_return_pct: f64) -> Opportunity {
        Opportunity {
            entity_name: name.to_string(),
            alpha_score: alpha,
            expected_return_pct,
            volatility_pct: 5.0,
            sharpe_like_ratio: 1.0,
            percentile_5: 1.0,
            percentile_50: 2.0,
            percentile_95: 3.0,
            probability_positive: 60.0,
            trend_strength_pct: 0.0,
            job_momentum: None,
            confidence: Confidence::Medium,
            risk_level: RiskLevel::Low,
            composite_outlook: None,
            rating: None,
            timestamp: Utc::now(),
        }
    }

    fn names(list: &[Opportunity]) -> Vec<&str> {
        list.iter().map(|o| o.entity_name.as_str()).collect()
    }

    #[test]
    fn filters_strictly_above_threshold() {
        let ranked = rank(
            vec![opp("a", 1.0, 15.0), opp("b", 2.0, 15.01), opp("c", 3.0, 40.0)],
            15.0,
        );
        assert_eq!(names(&ranked.opportunities), vec!["c", "b"]);
        assert_eq!(names(&ranked.all_evaluations), vec!["c", "b", "a"]);
    }

    #[test]
    fn ties_keep_input_order() {
        let ranked = rank(
            vec![opp("first", 5.0, 20.0), opp("second", 5.0, 20.0), opp("top", 9.0, 1.0)],
            15.0,
        );
        assert_eq!(names(&ranked.all_evaluations), vec!["top", "first", "second"]);
        assert_eq!(names(&ranked.opportunities), vec!["first", "second"]);
    }

    #[test]
    fn empty_input() {
        let ranked = rank(Vec::new(), 15.0);
        assert!(ranked.opportunities.is_empty());
        assert!(ranked.all_evaluations.is_empty());
    }
}
