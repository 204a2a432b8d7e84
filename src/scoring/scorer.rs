// =============================================================================
// Opportunity Scorer — composite alpha, confidence, risk and outlook
// =============================================================================
//
//   alpha   = w_ret · expected_return_pct
//           + w_mom · job_momentum_pct            (0 when momentum is missing)
//           + w_shp · (sharpe_scale · sharpe_like_ratio)
//
//   outlook = w_trend · trend_strength_pct + w_mom · momentum_pct
//             > bullish_above → bullish, < bearish_below → bearish, else neutral
//
// The outlook needs both signals.  Without momentum the rating is omitted
// rather than guessed, even though the alpha score still falls back to a zero
// momentum term.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::forecast::{ForecastResult, MomentumResult};
use crate::runtime_config::{EngineConfig, OutlookWeights, ScoreWeights};
use crate::simulation::SimulationResult;
use crate::types::{Confidence, Rating, RiskLevel};

/// Directional outlook from trend and momentum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outlook {
    pub composite: f64,
    pub rating: Rating,
}

/// One scored entity. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub entity_name: String,
    pub alpha_score: f64,
    pub expected_return_pct: f64,
    pub volatility_pct: f64,
    pub sharpe_like_ratio: f64,
    pub percentile_5: f64,
    pub percentile_50: f64,
    pub percentile_95: f64,
    pub probability_positive: f64,
    pub trend_strength_pct: f64,
    /// Job momentum in percent; `None` when the count series was too short.
    pub job_momentum: Option<f64>,
    pub confidence: Confidence,
    pub risk_level: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_outlook: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    pub timestamp: DateTime<Utc>,
}

impl Opportunity {
    /// Equality on everything except the creation timestamp.
    pub fn same_evaluation(&self, other: &Self) -> bool {
        Self {
            timestamp: other.timestamp,
            ..self.clone()
        } == *other
    }
}

/// Combines simulation output and momentum into an [`Opportunity`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OpportunityScorer {
    pub score_weights: ScoreWeights,
    pub outlook_weights: OutlookWeights,
}

impl OpportunityScorer {
    pub fn new(score_weights: ScoreWeights, outlook_weights: OutlookWeights) -> Self {
        Self {
            score_weights,
            outlook_weights,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.score_weights, config.outlook_weights)
    }

    /// Composite alpha score.
    pub fn alpha_score(&self, sim: &SimulationResult, momentum_pct: Option<f64>) -> f64 {
        let w = &self.score_weights;
        w.expected_return * sim.expected_return_pct
            + w.momentum * momentum_pct.unwrap_or(0.0)
            + w.sharpe * (w.sharpe_scale * sim.sharpe_like_ratio)
    }

    /// Outlook from trend strength and momentum; `None` without momentum.
    pub fn outlook(&self, trend_strength_pct: f64, momentum: Option<&MomentumResult>) -> Option<Outlook> {
        let momentum = momentum?;
        let w = &self.outlook_weights;
        let composite = w.trend * trend_strength_pct + w.momentum * momentum.momentum_pct;
        let rating = if composite > w.bullish_above {
            Rating::Bullish
        } else if composite < w.bearish_below {
            Rating::Bearish
        } else {
            Rating::Neutral
        };
        Some(Outlook { composite, rating })
    }

    /// Score one entity. Pure apart from the timestamp.
    pub fn score(
        &self,
        entity_name: &str,
        forecast: &ForecastResult,
        sim: &SimulationResult,
        momentum: Option<&MomentumResult>,
    ) -> Opportunity {
        let momentum_pct = momentum.map(|m| m.momentum_pct);
        let outlook = self.outlook(forecast.trend_strength_pct, momentum);

        Opportunity {
            entity_name: entity_name.to_string(),
            alpha_score: self.alpha_score(sim, momentum_pct),
            expected_return_pct: sim.expected_return_pct,
            volatility_pct: sim.volatility_pct,
            sharpe_like_ratio: sim.sharpe_like_ratio,
            percentile_5: sim.percentile_5,
            percentile_50: sim.percentile_50,
            percentile_95: sim.percentile_95,
            probability_positive: sim.probability_positive,
            trend_strength_pct: forecast.trend_strength_pct,
            job_momentum: momentum_pct,
            confidence: Confidence::from_probability_positive(sim.probability_positive),
            risk_level: RiskLevel::from_volatility_pct(sim.volatility_pct),
            composite_outlook: outlook.map(|o| o.composite),
            rating: outlook.map(|o| o.rating),
            timestamp: Utc::now(),
        }
    }
}
