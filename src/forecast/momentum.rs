// =============================================================================
// Job Momentum — short vs. medium moving average of posting counts
// =============================================================================
//
//   ma3          = mean(counts[0..3])
//   ma6          = mean(counts[0..6])
//   momentum_pct = (ma3 - ma6) / ma6 · 100        (0 when ma6 == 0)
//
// Counts are most-recent-first. Classification is a step function with
// exclusive boundaries: > +5 expansion, < -5 contraction, otherwise stable.
//
// Fewer than MIN_MOMENTUM_POINTS entries is an error, not a zero: a silent
// zero would masquerade as "stable" and bias the outlook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, EvalResult, SeriesKind};
use crate::series::CountSeries;
use crate::types::MomentumTrend;

/// Minimum number of count entries for a momentum signal.
pub const MIN_MOMENTUM_POINTS: usize = 6;

const SHORT_WINDOW: usize = 3;
const MEDIUM_WINDOW: usize = 6;

/// Boundary (exclusive) between stable and expansion/contraction, in percent.
const MOMENTUM_BAND_PCT: f64 = 5.0;

/// Momentum signal derived from a count series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumResult {
    pub current_count: u64,
    pub ma3: f64,
    pub ma6: f64,
    pub momentum_pct: f64,
    pub trend: MomentumTrend,
    pub created_at: DateTime<Utc>,
}

/// Classify a momentum percentage.
pub fn classify_momentum(momentum_pct: f64) -> MomentumTrend {
    if momentum_pct > MOMENTUM_BAND_PCT {
        MomentumTrend::Expansion
    } else if momentum_pct < -MOMENTUM_BAND_PCT {
        MomentumTrend::Contraction
    } else {
        MomentumTrend::Stable
    }
}

/// Compute the momentum signal for a most-recent-first count series.
pub fn estimate_momentum(series: &CountSeries) -> EvalResult<MomentumResult> {
    if series.len() < MIN_MOMENTUM_POINTS {
        return Err(EvalError::insufficient(
            SeriesKind::Counts,
            MIN_MOMENTUM_POINTS,
            series.len(),
        ));
    }

    let counts: Vec<f64> = series.counts().into_iter().map(|c| c as f64).collect();
    let ma3 = counts[..SHORT_WINDOW].iter().sum::<f64>() / SHORT_WINDOW as f64;
    let ma6 = counts[..MEDIUM_WINDOW].iter().sum::<f64>() / MEDIUM_WINDOW as f64;

    let momentum_pct = if ma6 > 0.0 {
        (ma3 - ma6) / ma6 * 100.0
    } else {
        0.0
    };

    Ok(MomentumResult {
        current_count: series.points[0].count,
        ma3,
        ma6,
        momentum_pct,
        trend: classify_momentum(momentum_pct),
        created_at: Utc::now(),
    })
}
