// =============================================================================
// Monte Carlo Projector — multiplicative random walk over the horizon
// =============================================================================
//
// Parameters are calibrated from the trend forecast:
//
//   μ (per step) = trend_strength_pct / 100 / H
//   σ (per step) = volatility / √H          (VOLATILITY_FLOOR if volatility is 0)
//
// Each of K independent paths starts at current_value and applies H shocks:
//
//   value ← value · (1 + ε),   ε ~ N(μ, σ)
//
// Only terminal values are kept.  Statistics are taken over the raw terminal
// distribution and expressed relative to current_value.
//
// Randomness is injected through `TerminalSampler`; the default sampler wraps
// any `rand::Rng`.  `rng_from_seed(None)` draws fresh entropy, so unseeded runs
// differ from one another.
// =============================================================================

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EvalError, EvalResult};
use crate::stats::{mean, percentile_sorted, population_std};

/// Per-step volatility used when the forecast shows no spread at all, so the
/// distribution never collapses to a single path.
pub const VOLATILITY_FLOOR: f64 = 0.01;

// =============================================================================
// Types
// =============================================================================

/// Inputs to one simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParams {
    pub current_value: f64,
    pub trend_strength_pct: f64,
    pub volatility: f64,
    pub horizon: usize,
    pub iterations: usize,
    /// Annual risk-free rate as a fraction.
    pub risk_free_rate: f64,
}

impl SimulationParams {
    /// Per-step drift μ.
    pub fn step_drift(&self) -> f64 {
        self.trend_strength_pct / 100.0 / self.horizon as f64
    }

    /// Per-step volatility σ (floored).
    pub fn step_volatility(&self) -> f64 {
        if self.volatility > 0.0 {
            self.volatility / (self.horizon as f64).sqrt()
        } else {
            VOLATILITY_FLOOR
        }
    }

    fn check(&self) -> EvalResult<()> {
        if !(self.current_value > 0.0) || !self.current_value.is_finite() {
            return Err(EvalError::InvalidInput(format!(
                "current value must be positive, got {}",
                self.current_value
            )));
        }
        if self.horizon == 0 || self.iterations == 0 {
            return Err(EvalError::InvalidInput(
                "horizon and iterations must be at least 1".into(),
            ));
        }
        if !self.trend_strength_pct.is_finite() || !self.volatility.is_finite() {
            return Err(EvalError::NonFinite { stage: "simulation params" });
        }
        Ok(())
    }
}

/// Summary of the simulated terminal-value distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub expected_return_pct: f64,
    pub volatility_pct: f64,
    pub sharpe_like_ratio: f64,
    pub percentile_5: f64,
    pub percentile_50: f64,
    pub percentile_95: f64,
    /// Share of terminal values above the starting value, in percent.
    pub probability_positive: f64,
    pub iterations: usize,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Samplers
// =============================================================================

/// Produces the K terminal values of a simulation.
pub trait TerminalSampler {
    fn sample_terminals(&mut self, params: &SimulationParams) -> EvalResult<Vec<f64>>;
}

/// Gaussian multiplicative random walk driven by an injected RNG.
pub struct RandomWalkSampler<R: Rng> {
    rng: R,
}

impl<R: Rng> RandomWalkSampler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> TerminalSampler for RandomWalkSampler<R> {
    fn sample_terminals(&mut self, params: &SimulationParams) -> EvalResult<Vec<f64>> {
        let shocks = Normal::new(params.step_drift(), params.step_volatility())
            .map_err(|e| EvalError::InvalidInput(format!("shock distribution: {e}")))?;

        let mut terminals = Vec::with_capacity(params.iterations);
        for _ in 0..params.iterations {
            let mut value = params.current_value;
            for _ in 0..params.horizon {
                value *= 1.0 + shocks.sample(&mut self.rng);
            }
            terminals.push(value);
        }
        Ok(terminals)
    }
}

/// Fixed terminal values, replayed for every call. Used to pin the
/// stochastic step in ranking tests.
#[derive(Debug, Clone)]
pub struct FixedTerminals(pub Vec<f64>);

impl TerminalSampler for FixedTerminals {
    fn sample_terminals(&mut self, _params: &SimulationParams) -> EvalResult<Vec<f64>> {
        Ok(self.0.clone())
    }
}

/// Seeded RNG when `seed` is set, otherwise fresh OS entropy.
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Summarise terminal values relative to `current_value`.
pub fn summarize_terminals(
    terminals: &[f64],
    current_value: f64,
    risk_free_rate: f64,
) -> EvalResult<SimulationResult> {
    if terminals.is_empty() {
        return Err(EvalError::InvalidInput("no terminal values".into()));
    }
    if !(current_value > 0.0) {
        return Err(EvalError::InvalidInput(format!(
            "current value must be positive, got {current_value}"
        )));
    }
    if terminals.iter().any(|v| !v.is_finite()) {
        return Err(EvalError::NonFinite { stage: "simulation paths" });
    }

    let mut sorted = terminals.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let avg = mean(&sorted).unwrap_or(current_value);
    let std_dev = population_std(&sorted).unwrap_or(0.0);

    let expected_return_pct = (avg - current_value) / current_value * 100.0;
    let volatility_pct = std_dev / current_value * 100.0;

    let excess_return = expected_return_pct - risk_free_rate * 100.0;
    let sharpe_like_ratio = if volatility_pct > 0.0 {
        excess_return / volatility_pct
    } else {
        0.0
    };

    let above = sorted.iter().filter(|&&v| v > current_value).count();
    let probability_positive = above as f64 / sorted.len() as f64 * 100.0;

    let pct = |p: f64| percentile_sorted(&sorted, p).unwrap_or(current_value);

    Ok(SimulationResult {
        expected_return_pct,
        volatility_pct,
        sharpe_like_ratio,
        percentile_5: pct(5.0),
        percentile_50: pct(50.0),
        percentile_95: pct(95.0),
        probability_positive,
        iterations: sorted.len(),
        created_at: Utc::now(),
    })
}

// =============================================================================
// Projector
// =============================================================================

/// Runs simulations with a fixed horizon, iteration count and risk-free rate.
#[derive(Debug, Clone, Copy)]
pub struct MonteCarloProjector {
    pub horizon: usize,
    pub iterations: usize,
    pub risk_free_rate: f64,
}

impl MonteCarloProjector {
    pub fn new(horizon: usize, iterations: usize, risk_free_rate: f64) -> Self {
        Self {
            horizon,
            iterations,
            risk_free_rate,
        }
    }

    pub fn params(&self, current_value: f64, trend_strength_pct: f64, volatility: f64) -> SimulationParams {
        SimulationParams {
            current_value,
            trend_strength_pct,
            volatility,
            horizon: self.horizon,
            iterations: self.iterations,
            risk_free_rate: self.risk_free_rate,
        }
    }

    /// Simulate with an arbitrary terminal sampler.
    pub fn project_with<S: TerminalSampler + ?Sized>(
        &self,
        sampler: &mut S,
        current_value: f64,
        trend_strength_pct: f64,
        volatility: f64,
    ) -> EvalResult<SimulationResult> {
        let params = self.params(current_value, trend_strength_pct, volatility);
        params.check()?;

        let terminals = sampler.sample_terminals(&params)?;
        let result = summarize_terminals(&terminals, current_value, self.risk_free_rate)?;

        debug!(
            drift = format!("{:.5}", params.step_drift()),
            step_vol = format!("{:.5}", params.step_volatility()),
            expected_return_pct = format!("{:.2}", result.expected_return_pct),
            probability_positive = format!("{:.1}", result.probability_positive),
            "simulation complete"
        );

        Ok(result)
    }

    /// Simulate a Gaussian random walk driven by `rng`.
    pub fn project<R: Rng>(
        &self,
        rng: &mut R,
        current_value: f64,
        trend_strength_pct: f64,
        volatility: f64,
    ) -> EvalResult<SimulationResult> {
        let mut sampler = RandomWalkSampler::new(rng);
        self.project_with(&mut sampler, current_value, trend_strength_pct, volatility)
    }
}

impl Default for MonteCarloProjector {
    fn default() -> Self {
        Self::new(30, 1000, 0.045)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_and_floor() {
        let p = MonteCarloProjector::default().params(50.0, 30.0, 0.0);
        assert!((p.step_drift() - 0.01).abs() < 1e-12);
        assert_eq!(p.step_volatility(), VOLATILITY_FLOOR);

        let p = MonteCarloProjector::default().params(50.0, 0.0, 3.0);
        assert!((p.step_volatility() - 3.0 / 30f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn flat_zero_volatility_is_symmetric() {
        let projector = MonteCarloProjector::new(30, 20_000, 0.045);
        let mut rng = StdRng::seed_from_u64(11);
        let r = projector.project(&mut rng, 50.0, 0.0, 0.0).unwrap();

        assert!(r.expected_return_pct.abs() < 0.5, "E[r] = {}", r.expected_return_pct);
        assert!(
            (r.probability_positive - 50.0).abs() < 3.0,
            "P(+) = {}",
            r.probability_positive
        );
        // Floor volatility keeps the distribution from collapsing.
        assert!(r.volatility_pct > 1.0);
        assert!(r.percentile_5 < r.percentile_50 && r.percentile_50 < r.percentile_95);
    }

    #[test]
    fn probability_positive_rises_with_trend() {
        let projector = MonteCarloProjector::new(30, 5_000, 0.045);
        for seed in [1_u64, 2, 3] {
            let mut probs = Vec::new();
            for trend in [-20.0, 0.0, 20.0] {
                let mut rng = StdRng::seed_from_u64(seed);
                let r = projector.project(&mut rng, 50.0, trend, 0.1).unwrap();
                probs.push(r.probability_positive);
            }
            assert!(probs[0] <= probs[1] && probs[1] <= probs[2], "{probs:?}");
            assert!(probs[2] - probs[0] > 50.0, "{probs:?}");
        }
    }

    #[test]
    fn seeded_runs_reproduce() {
        let projector = MonteCarloProjector::new(30, 500, 0.045);
        let a = projector
            .project(&mut rng_from_seed(Some(99)), 60.0, 5.0, 1.5)
            .unwrap();
        let b = projector
            .project(&mut rng_from_seed(Some(99)), 60.0, 5.0, 1.5)
            .unwrap();
        assert_eq!(a.expected_return_pct, b.expected_return_pct);
        assert_eq!(a.percentile_95, b.percentile_95);
        assert_eq!(a.probability_positive, b.probability_positive);
    }

    #[test]
    fn unseeded_runs_draw_fresh_randomness() {
        let projector = MonteCarloProjector::new(30, 200, 0.045);
        let a = projector.project(&mut rng_from_seed(None), 60.0, 5.0, 1.5).unwrap();
        let b = projector.project(&mut rng_from_seed(None), 60.0, 5.0, 1.5).unwrap();
        assert_ne!(a.percentile_50, b.percentile_50);
    }

    #[test]
    fn summary_of_fixed_terminals() {
        let r = summarize_terminals(&[120.0, 90.0, 110.0, 100.0], 100.0, 0.045).unwrap();
        assert!((r.expected_return_pct - 5.0).abs() < 1e-12);
        let vol = 125f64.sqrt();
        assert!((r.volatility_pct - vol).abs() < 1e-9);
        assert!((r.sharpe_like_ratio - 0.5 / vol).abs() < 1e-9);
        assert!((r.probability_positive - 50.0).abs() < 1e-12);
        assert!((r.percentile_50 - 105.0).abs() < 1e-12);
        assert_eq!(r.iterations, 4);
    }

    #[test]
    fn zero_dispersion_has_zero_sharpe() {
        let r = summarize_terminals(&[130.0; 8], 100.0, 0.045).unwrap();
        assert_eq!(r.volatility_pct, 0.0);
        assert_eq!(r.sharpe_like_ratio, 0.0);
        assert!((r.expected_return_pct - 30.0).abs() < 1e-12);
        assert_eq!(r.probability_positive, 100.0);
    }

    #[test]
    fn non_positive_start_is_rejected() {
        let projector = MonteCarloProjector::default();
        let mut sampler = FixedTerminals(vec![1.0]);
        let err = projector.project_with(&mut sampler, 0.0, 1.0, 1.0).unwrap_err();
        assert!(matches!(err, EvalError::InvalidInput(_)));
    }
}
