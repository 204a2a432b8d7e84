// =============================================================================
// Engine Configuration — every tunable of a pipeline run, with atomic save
// =============================================================================
//
// Horizon, iteration count, risk-free rate, thresholds and score weights all
// live here and are threaded explicitly into the forecaster, projector and
// scorer.  Nothing in the numerical core reads module-level tunables.
//
// Persistence uses an atomic tmp + rename pattern.  All fields carry
// `#[serde(default)]` so that adding new fields never breaks loading an older
// config file.
//
// =============================================================================

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::EntityDescriptor;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_entities() -> Vec<EntityDescriptor> {
    vec![
        EntityDescriptor::new("VALE", "mining"),
        EntityDescriptor::new("BHP", "mining"),
        EntityDescriptor::new("RIO", "mining"),
        EntityDescriptor::new("EXXON", "energy"),
        EntityDescriptor::new("CHEVRON", "energy"),
    ]
}

fn default_horizon_days() -> usize {
    30
}

fn default_monte_carlo_iterations() -> usize {
    1000
}

fn default_risk_free_rate() -> f64 {
    0.045
}

fn default_opportunity_threshold_pct() -> f64 {
    15.0
}

fn default_staleness_hours() -> f64 {
    2.0
}

fn default_lookback_days() -> usize {
    30
}

fn default_job_months() -> usize {
    12
}

// =============================================================================
// BoundRange
// =============================================================================

/// Physical range of the observed metric; forecasts are clipped into it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundRange {
    pub lo: f64,
    pub hi: f64,
}

impl BoundRange {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    /// True when `lo < hi` and neither bound is NaN.
    pub fn is_valid(&self) -> bool {
        self.lo < self.hi
    }

    /// Clamp `value` into the range. An unordered range leaves it unchanged.
    pub fn clip(&self, value: f64) -> f64 {
        if self.is_valid() {
            value.clamp(self.lo, self.hi)
        } else {
            value
        }
    }
}

impl Default for BoundRange {
    fn default() -> Self {
        Self { lo: 0.0, hi: 100.0 }
    }
}

// =============================================================================
// Weights
// =============================================================================

/// Weights of the composite alpha score.
///
/// alpha = return · expected_return_pct
///       + momentum · job_momentum_pct
///       + sharpe · (sharpe_scale · sharpe_like_ratio)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    #[serde(default = "ScoreWeights::default_return")]
    pub expected_return: f64,
    #[serde(default = "ScoreWeights::default_momentum")]
    pub momentum: f64,
    #[serde(default = "ScoreWeights::default_sharpe")]
    pub sharpe: f64,
    #[serde(default = "ScoreWeights::default_sharpe_scale")]
    pub sharpe_scale: f64,
}

impl ScoreWeights {
    fn default_return() -> f64 {
        0.5
    }
    fn default_momentum() -> f64 {
        0.3
    }
    fn default_sharpe() -> f64 {
        0.2
    }
    fn default_sharpe_scale() -> f64 {
        10.0
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            expected_return: Self::default_return(),
            momentum: Self::default_momentum(),
            sharpe: Self::default_sharpe(),
            sharpe_scale: Self::default_sharpe_scale(),
        }
    }
}

/// Weights and cut-offs of the directional outlook (rating).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlookWeights {
    #[serde(default = "OutlookWeights::default_trend")]
    pub trend: f64,
    #[serde(default = "OutlookWeights::default_momentum")]
    pub momentum: f64,
    #[serde(default = "OutlookWeights::default_bullish_above")]
    pub bullish_above: f64,
    #[serde(default = "OutlookWeights::default_bearish_below")]
    pub bearish_below: f64,
}

impl OutlookWeights {
    fn default_trend() -> f64 {
        0.6
    }
    fn default_momentum() -> f64 {
        0.4
    }
    fn default_bullish_above() -> f64 {
        10.0
    }
    fn default_bearish_below() -> f64 {
        -10.0
    }
}

impl Default for OutlookWeights {
    fn default() -> Self {
        Self {
            trend: Self::default_trend(),
            momentum: Self::default_momentum(),
            bullish_above: Self::default_bullish_above(),
            bearish_below: Self::default_bearish_below(),
        }
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level configuration for a pipeline run.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    // --- Universe ------------------------------------------------------------

    /// Entities evaluated on every run, in processing (tie-break) order.
    #[serde(default = "default_entities")]
    pub entities: Vec<EntityDescriptor>,

    // --- Forecast & simulation ----------------------------------------------

    /// Days ahead to forecast and simulate.
    #[serde(default = "default_horizon_days")]
    pub horizon_days: usize,

    /// Independent Monte Carlo paths per entity.
    #[serde(default = "default_monte_carlo_iterations")]
    pub monte_carlo_iterations: usize,

    /// Annual risk-free rate as a fraction (0.045 = 4.5 %).
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,

    /// Physical range of the activity metric.
    #[serde(default)]
    pub bound_range: BoundRange,

    /// Minimum expected return (percent) for an entity to count as an
    /// opportunity.
    #[serde(default = "default_opportunity_threshold_pct")]
    pub opportunity_threshold_pct: f64,

    // --- Scoring --------------------------------------------------------------

    #[serde(default)]
    pub score_weights: ScoreWeights,

    #[serde(default)]
    pub outlook_weights: OutlookWeights,

    // --- Execution ------------------------------------------------------------

    /// Fixed RNG seed. `None` draws fresh entropy on every run.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Evaluate entities as independent blocking tasks.
    #[serde(default)]
    pub parallel: bool,

    /// Wall-clock budget for a parallel run; unfinished entities are failed.
    #[serde(default)]
    pub max_run_secs: Option<u64>,

    // --- Health & synthetic data ---------------------------------------------

    /// Age after which a stage's metadata counts as stale.
    #[serde(default = "default_staleness_hours")]
    pub staleness_hours: f64,

    /// Days of synthetic activity history per entity.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: usize,

    /// Months of synthetic job-posting history per entity.
    #[serde(default = "default_job_months")]
    pub job_months: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            entities: default_entities(),
            horizon_days: default_horizon_days(),
            monte_carlo_iterations: default_monte_carlo_iterations(),
            risk_free_rate: default_risk_free_rate(),
            bound_range: BoundRange::default(),
            opportunity_threshold_pct: default_opportunity_threshold_pct(),
            score_weights: ScoreWeights::default(),
            outlook_weights: OutlookWeights::default(),
            seed: None,
            parallel: false,
            max_run_secs: None,
            staleness_hours: default_staleness_hours(),
            lookback_days: default_lookback_days(),
            job_months: default_job_months(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("invalid engine config in {}", path.display()))?;

        info!(
            path = %path.display(),
            entities = config.entities.len(),
            horizon_days = config.horizon_days,
            iterations = config.monte_carlo_iterations,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }

    /// Reject configurations the core cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.horizon_days == 0 {
            bail!("horizon_days must be at least 1");
        }
        if self.monte_carlo_iterations == 0 {
            bail!("monte_carlo_iterations must be at least 1");
        }
        if !self.bound_range.is_valid() {
            bail!(
                "bound_range lo ({}) must be below hi ({})",
                self.bound_range.lo,
                self.bound_range.hi
            );
        }
        if !self.risk_free_rate.is_finite() || !self.opportunity_threshold_pct.is_finite() {
            bail!("risk_free_rate and opportunity_threshold_pct must be finite");
        }
        Ok(())
    }

    /// Apply `ALPHA_ENTITIES` / `ALPHA_SEED` environment overrides.
    ///
    /// Overrides live in memory only; the file on disk is never rewritten.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides read through `lookup` (keyed by environment variable name).
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(names) = lookup("ALPHA_ENTITIES") {
            let entities: Vec<EntityDescriptor> = names
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .map(|name| EntityDescriptor::new(name, ""))
                .collect();
            if !entities.is_empty() {
                self.entities = entities;
            }
        }
        if let Some(seed) = lookup("ALPHA_SEED").and_then(|s| s.trim().parse::<u64>().ok())
        {
            self.seed = Some(seed);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.horizon_days, 30);
        assert_eq!(cfg.monte_carlo_iterations, 1000);
        assert!((cfg.risk_free_rate - 0.045).abs() < f64::EPSILON);
        assert_eq!(cfg.bound_range, BoundRange::new(0.0, 100.0));
        assert!((cfg.opportunity_threshold_pct - 15.0).abs() < f64::EPSILON);
        assert_eq!(cfg.entities.len(), 5);
        assert_eq!(cfg.entities[0].name, "VALE");
        assert!(cfg.seed.is_none());
        assert!(!cfg.parallel);
        assert!((cfg.score_weights.expected_return - 0.5).abs() < f64::EPSILON);
        assert!((cfg.outlook_weights.trend - 0.6).abs() < f64::EPSILON);
        cfg.validate().unwrap();
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.horizon_days, 30);
        assert_eq!(cfg.entities.len(), 5);
        assert!((cfg.score_weights.sharpe_scale - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{
            "horizon_days": 14,
            "score_weights": { "momentum": 0.1 },
            "entities": [{ "name": "RIO" }]
        }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.horizon_days, 14);
        assert_eq!(cfg.entities, vec![EntityDescriptor::new("RIO", "")]);
        assert!((cfg.score_weights.momentum - 0.1).abs() < f64::EPSILON);
        assert!((cfg.score_weights.expected_return - 0.5).abs() < f64::EPSILON);
        assert_eq!(cfg.monte_carlo_iterations, 1000);
    }

    #[test]
    fn validate_rejects_degenerate_settings() {
        let mut cfg = EngineConfig::default();
        cfg.horizon_days = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.bound_range = BoundRange::new(100.0, 0.0);
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.monte_carlo_iterations = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn save_then_load_preserves_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine_config.json");

        let mut cfg = EngineConfig::default();
        cfg.seed = Some(7);
        cfg.opportunity_threshold_pct = 12.5;
        cfg.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.seed, Some(7));
        assert!((loaded.opportunity_threshold_pct - 12.5).abs() < f64::EPSILON);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn bound_range_clips() {
        let range = BoundRange::default();
        assert_eq!(range.clip(-3.0), 0.0);
        assert_eq!(range.clip(140.0), 100.0);
        assert_eq!(range.clip(42.0), 42.0);
    }

    #[test]
    fn unordered_bound_range_does_not_clip() {
        let inverted = BoundRange::new(100.0, 0.0);
        assert!(!inverted.is_valid());
        assert_eq!(inverted.clip(42.0), 42.0);
        assert!(!BoundRange::new(f64::NAN, 100.0).is_valid());
    }

    #[test]
    fn overrides_stay_out_of_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine_config.json");
        EngineConfig::default().save(&path).unwrap();

        let mut cfg = EngineConfig::load(&path).unwrap();
        cfg.apply_overrides_from(|key| match key {
            "ALPHA_SEED" => Some(" 7 ".to_string()),
            "ALPHA_ENTITIES" => Some("rio, ,bhp".to_string()),
            _ => None,
        });
        assert_eq!(cfg.seed, Some(7));
        assert_eq!(
            cfg.entities,
            vec![EntityDescriptor::new("RIO", ""), EntityDescriptor::new("BHP", "")]
        );

        let reloaded = EngineConfig::load(&path).unwrap();
        assert!(reloaded.seed.is_none());
        assert_eq!(reloaded.entities.len(), 5);
    }

    #[test]
    fn unparsable_seed_override_is_ignored() {
        let mut cfg = EngineConfig::default();
        cfg.apply_overrides_from(|key| (key == "ALPHA_SEED").then(|| "abc".to_string()));
        assert!(cfg.seed.is_none());
        assert_eq!(cfg.entities.len(), 5);
    }
}
