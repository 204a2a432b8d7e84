// =============================================================================
// Pipeline Coordinator — forecast, simulate, score and rank every entity
// =============================================================================
//
// Pipeline (one run):
//   1. Read raw activity + job series for every configured entity.
//   2. Per entity, independently:
//        a. Trend forecast (skip entity on insufficient data)
//        b. Job momentum (absent on insufficient data, never zero)
//        c. Monte Carlo projection seeded from the forecast
//        d. Opportunity scoring
//   3. Rank all scored entities (stable, by alpha descending).
//   4. Write forecasts, opportunities and run metadata to the store.
//
// Each entity gets its own RNG derived from the run seed and its position in
// the entity list, so sequential and parallel runs with the same seed produce
// identical output.  Entities are never partially recorded: an entity either
// has a complete Opportunity or is reported as skipped / failed.
// =============================================================================

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{EvalError, EvalResult};
use crate::forecast::{estimate_momentum, forecast_trend, ForecastResult, MomentumResult};
use crate::runtime_config::EngineConfig;
use crate::scoring::{rank, Opportunity, OpportunityScorer, RankedOpportunities};
use crate::series::{CountSeries, ObservationSeries, RawActivityRecord, RawJobsRecord};
use crate::simulation::{rng_from_seed, MonteCarloProjector, RandomWalkSampler, SimulationResult, TerminalSampler};
use crate::store::{get_json, keys, set_json, KvStore};
use crate::types::Rating;

// =============================================================================
// Per-entity types
// =============================================================================

/// Raw series for one entity, as read from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityInput {
    pub entity_name: String,
    pub observations: Option<ObservationSeries>,
    pub counts: Option<CountSeries>,
}

/// Every record produced for a fully evaluated entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEvaluation {
    pub forecast: ForecastResult,
    pub momentum: Option<MomentumResult>,
    pub simulation: SimulationResult,
    pub opportunity: Opportunity,
}

/// Forecast-stage record written under `forecasts:all_entities`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityForecastRecord {
    pub entity_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<ForecastResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<MomentumResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_outlook: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
}

/// How an entity's evaluation ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntityStatus {
    Evaluated,
    Skipped { reason: String },
    Failed { reason: String },
}

/// Outcome of one entity within a run.
#[derive(Debug, Clone)]
pub struct EntityReport {
    pub entity_name: String,
    pub status: EntityStatus,
    pub forecast_record: EntityForecastRecord,
    pub evaluation: Option<EntityEvaluation>,
}

// =============================================================================
// Core entry point
// =============================================================================

/// Forecast, simulate and score one entity.
///
/// Fails with [`EvalError::InsufficientData`] when the observation series is
/// too short; a short count series only removes the momentum signal.
pub fn forecast_and_simulate<S: TerminalSampler + ?Sized>(
    entity_name: &str,
    observations: &ObservationSeries,
    counts: Option<&CountSeries>,
    config: &EngineConfig,
    sampler: &mut S,
) -> EvalResult<EntityEvaluation> {
    let forecast = forecast_trend(observations, config.horizon_days, config.bound_range)?;
    let momentum = counts.and_then(|c| momentum_or_absent(entity_name, c));

    let projector = MonteCarloProjector::new(
        config.horizon_days,
        config.monte_carlo_iterations,
        config.risk_free_rate,
    );
    let simulation = projector.project_with(
        sampler,
        forecast.current_value,
        forecast.trend_strength_pct,
        forecast.leading_volatility(),
    )?;

    let opportunity = OpportunityScorer::from_config(config).score(
        entity_name,
        &forecast,
        &simulation,
        momentum.as_ref(),
    );
    if !opportunity.alpha_score.is_finite() {
        return Err(EvalError::NonFinite { stage: "alpha score" });
    }

    Ok(EntityEvaluation {
        forecast,
        momentum,
        simulation,
        opportunity,
    })
}

fn momentum_or_absent(entity_name: &str, counts: &CountSeries) -> Option<MomentumResult> {
    match estimate_momentum(counts) {
        Ok(m) => Some(m),
        Err(e) => {
            debug!(entity = %entity_name, reason = %e, "no momentum signal");
            None
        }
    }
}

/// Evaluate one entity input into a complete report.
pub fn evaluate_input<S: TerminalSampler + ?Sized>(
    input: &EntityInput,
    config: &EngineConfig,
    sampler: &mut S,
) -> EntityReport {
    let name = input.entity_name.as_str();
    let scorer = OpportunityScorer::from_config(config);

    let result = match &input.observations {
        Some(obs) => forecast_and_simulate(name, obs, input.counts.as_ref(), config, sampler),
        None => Err(EvalError::InvalidInput("no observation series".into())),
    };

    match result {
        Ok(evaluation) => {
            let outlook = scorer.outlook(
                evaluation.forecast.trend_strength_pct,
                evaluation.momentum.as_ref(),
            );
            debug!(
                entity = %name,
                trend_strength_pct = format!("{:+.1}", evaluation.forecast.trend_strength_pct),
                momentum_pct = ?evaluation.momentum.as_ref().map(|m| format!("{:+.1}", m.momentum_pct)),
                alpha = format!("{:.2}", evaluation.opportunity.alpha_score),
                "entity evaluated"
            );
            EntityReport {
                entity_name: name.to_string(),
                status: EntityStatus::Evaluated,
                forecast_record: EntityForecastRecord {
                    entity_name: name.to_string(),
                    timestamp: Utc::now(),
                    activity: Some(evaluation.forecast.clone()),
                    jobs: evaluation.momentum.clone(),
                    composite_outlook: outlook.map(|o| o.composite),
                    rating: outlook.map(|o| o.rating),
                },
                evaluation: Some(evaluation),
            }
        }
        Err(err) => {
            // Forecast-stage record still carries whatever signal exists.
            let jobs = input
                .counts
                .as_ref()
                .and_then(|c| momentum_or_absent(name, c));
            let status = if err.is_insufficient() || input.observations.is_none() {
                debug!(entity = %name, reason = %err, "entity skipped");
                EntityStatus::Skipped {
                    reason: err.to_string(),
                }
            } else {
                warn!(entity = %name, error = %err, "entity evaluation failed");
                EntityStatus::Failed {
                    reason: err.to_string(),
                }
            };
            EntityReport {
                entity_name: name.to_string(),
                status,
                forecast_record: EntityForecastRecord {
                    entity_name: name.to_string(),
                    timestamp: Utc::now(),
                    activity: None,
                    jobs,
                    composite_outlook: None,
                    rating: None,
                },
                evaluation: None,
            }
        }
    }
}

/// RNG for the entity at `index`: derived from the run seed, or fresh entropy.
pub fn entity_rng(seed: Option<u64>, index: usize) -> StdRng {
    rng_from_seed(seed.map(|s| s.wrapping_add(index as u64)))
}

// =============================================================================
// Run output
// =============================================================================

/// Metadata describing one completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub duration_seconds: f64,
    pub status: String,
    pub horizon_days: usize,
    pub monte_carlo_iterations: usize,
    pub parallel: bool,
    pub entities_total: usize,
    pub entities_evaluated: usize,
    pub entities_skipped: usize,
    pub entities_failed: usize,
    pub opportunities_found: usize,
    /// SHA-256 of the input series; equal digests mean equal tie-break order.
    pub snapshot_digest: String,
}

/// `alpha_opportunities` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityReport {
    pub run_id: String,
    #[serde(flatten)]
    pub ranked: RankedOpportunities,
    pub monte_carlo_iterations: usize,
}

/// `forecasts:all_entities` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastReport {
    pub run_id: String,
    pub forecasts: Vec<EntityForecastRecord>,
    pub horizon_days: usize,
    pub timestamp: DateTime<Utc>,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub ranked: RankedOpportunities,
    pub entities: Vec<EntityReport>,
}

/// SHA-256 (hex) over the serialised inputs, in processing order.
///
/// Every field is length-prefixed so that field boundaries are part of the
/// digest.
pub fn snapshot_digest(inputs: &[EntityInput]) -> String {
    fn field(hasher: &mut Sha256, bytes: &[u8]) {
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }

    let mut hasher = Sha256::new();
    hasher.update((inputs.len() as u64).to_le_bytes());
    for input in inputs {
        field(&mut hasher, input.entity_name.as_bytes());
        field(&mut hasher, &serde_json::to_vec(&input.observations).unwrap_or_default());
        field(&mut hasher, &serde_json::to_vec(&input.counts).unwrap_or_default());
    }
    hex::encode(hasher.finalize())
}

/// Report for an entity whose evaluation never produced a result.
fn failed_report(entity_name: String, reason: &str) -> EntityReport {
    EntityReport {
        entity_name: entity_name.clone(),
        status: EntityStatus::Failed {
            reason: reason.to_string(),
        },
        forecast_record: EntityForecastRecord {
            entity_name,
            timestamp: Utc::now(),
            activity: None,
            jobs: None,
            composite_outlook: None,
            rating: None,
        },
        evaluation: None,
    }
}

/// Evaluate every input in order on the calling thread.
pub fn evaluate_in_order(config: &EngineConfig, inputs: &[EntityInput]) -> Vec<EntityReport> {
    inputs
        .iter()
        .enumerate()
        .map(|(index, input)| {
            let mut sampler = RandomWalkSampler::new(entity_rng(config.seed, index));
            evaluate_input(input, config, &mut sampler)
        })
        .collect()
}

// =============================================================================
// Coordinator
// =============================================================================

pub struct PipelineCoordinator {
    config: Arc<EngineConfig>,
}

impl PipelineCoordinator {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read raw series for every configured entity, in configuration order.
    ///
    /// An undecodable record is logged and treated as missing so that one
    /// corrupt entry cannot abort the run.
    pub fn load_inputs(&self, store: &dyn KvStore) -> Result<Vec<EntityInput>> {
        let mut inputs = Vec::with_capacity(self.config.entities.len());
        for entity in &self.config.entities {
            let name = entity.name.as_str();

            let observations = match get_json::<RawActivityRecord>(store, &keys::raw_activity(name)) {
                Ok(raw) => raw.as_ref().map(ObservationSeries::from),
                Err(e) => {
                    warn!(entity = %name, error = %e, "unreadable activity record");
                    None
                }
            };
            let counts = match get_json::<RawJobsRecord>(store, &keys::raw_jobs(name)) {
                Ok(raw) => raw.as_ref().map(CountSeries::from),
                Err(e) => {
                    warn!(entity = %name, error = %e, "unreadable jobs record");
                    None
                }
            };

            inputs.push(EntityInput {
                entity_name: name.to_string(),
                observations,
                counts,
            });
        }
        Ok(inputs)
    }

    /// Evaluate every input in order on the current thread.
    pub fn evaluate_sequential(&self, inputs: &[EntityInput]) -> Vec<EntityReport> {
        evaluate_in_order(&self.config, inputs)
    }

    /// Evaluate every input in order on one blocking thread, keeping the
    /// async workers free.
    pub async fn evaluate_sequential_blocking(&self, inputs: Vec<EntityInput>) -> Vec<EntityReport> {
        let names: Vec<String> = inputs.iter().map(|i| i.entity_name.clone()).collect();
        let config = Arc::clone(&self.config);
        match tokio::task::spawn_blocking(move || evaluate_in_order(&config, &inputs)).await {
            Ok(reports) => reports,
            Err(e) => {
                warn!(error = %e, "sequential evaluation task failed");
                names
                    .into_iter()
                    .map(|name| failed_report(name, "evaluation task failed"))
                    .collect()
            }
        }
    }

    /// Evaluate every input as an independent blocking task.
    ///
    /// Reports come back in input order.  With `max_run_secs` set, entities
    /// still running at the deadline are reported as failed.  Blocking tasks
    /// cannot be interrupted: an abandoned entity keeps computing on its
    /// blocking thread until it finishes, and its result is discarded.
    pub async fn evaluate_parallel(&self, inputs: Vec<EntityInput>) -> Vec<EntityReport> {
        let names: Vec<String> = inputs.iter().map(|i| i.entity_name.clone()).collect();
        let mut slots: Vec<Option<EntityReport>> = vec![None; inputs.len()];

        let mut set = JoinSet::new();
        for (index, input) in inputs.into_iter().enumerate() {
            let config = Arc::clone(&self.config);
            set.spawn_blocking(move || {
                let mut sampler = RandomWalkSampler::new(entity_rng(config.seed, index));
                (index, evaluate_input(&input, &config, &mut sampler))
            });
        }

        let deadline = self
            .config
            .max_run_secs
            .map(|secs| tokio::time::Instant::now() + std::time::Duration::from_secs(secs));
        let mut timed_out = false;

        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, set.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(pending = set.len(), "run budget exceeded, abandoning remaining entities");
                        set.abort_all();
                        timed_out = true;
                        break;
                    }
                },
                None => set.join_next().await,
            };

            match next {
                Some(Ok((index, report))) => slots[index] = Some(report),
                Some(Err(e)) => warn!(error = %e, "entity task failed"),
                None => break,
            }
        }

        let reason = if timed_out {
            "run budget exceeded"
        } else {
            "evaluation task failed"
        };

        slots
            .into_iter()
            .zip(names)
            .map(|(slot, name)| slot.unwrap_or_else(|| failed_report(name, reason)))
            .collect()
    }

    /// Evaluate `inputs` and rank the results without touching any store.
    pub async fn evaluate(&self, inputs: Vec<EntityInput>) -> RunReport {
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let digest = snapshot_digest(&inputs);
        let total = inputs.len();

        info!(
            run_id = %run_id,
            entities = total,
            parallel = self.config.parallel,
            seeded = self.config.seed.is_some(),
            "pipeline run started"
        );

        let entities = if self.config.parallel {
            self.evaluate_parallel(inputs).await
        } else {
            self.evaluate_sequential_blocking(inputs).await
        };

        let candidates: Vec<Opportunity> = entities
            .iter()
            .filter_map(|r| r.evaluation.as_ref().map(|e| e.opportunity.clone()))
            .collect();
        let ranked = rank(candidates, self.config.opportunity_threshold_pct);

        for opp in &ranked.opportunities {
            info!(
                entity = %opp.entity_name,
                expected_return_pct = format!("{:.1}", opp.expected_return_pct),
                sharpe = format!("{:.2}", opp.sharpe_like_ratio),
                risk = %opp.risk_level,
                confidence = %opp.confidence,
                "OPPORTUNITY"
            );
        }

        let (mut evaluated, mut skipped, mut failed) = (0, 0, 0);
        for report in &entities {
            match report.status {
                EntityStatus::Evaluated => evaluated += 1,
                EntityStatus::Skipped { .. } => skipped += 1,
                EntityStatus::Failed { .. } => failed += 1,
            }
        }

        let duration_seconds = started.elapsed().as_secs_f64();
        let metadata = RunMetadata {
            run_id,
            timestamp: Utc::now(),
            duration_seconds,
            status: if failed == 0 { "success" } else { "partial" }.to_string(),
            horizon_days: self.config.horizon_days,
            monte_carlo_iterations: self.config.monte_carlo_iterations,
            parallel: self.config.parallel,
            entities_total: total,
            entities_evaluated: evaluated,
            entities_skipped: skipped,
            entities_failed: failed,
            opportunities_found: ranked.opportunities.len(),
            snapshot_digest: digest,
        };

        info!(
            run_id = %metadata.run_id,
            evaluated,
            skipped,
            failed,
            opportunities = metadata.opportunities_found,
            duration_secs = format!("{:.2}", duration_seconds),
            "pipeline run complete"
        );

        RunReport {
            metadata,
            ranked,
            entities,
        }
    }

    /// Full run: read inputs, evaluate, rank and persist every output.
    pub async fn run(&self, store: &dyn KvStore) -> Result<RunReport> {
        let inputs = self.load_inputs(store)?;
        let report = self.evaluate(inputs).await;
        self.persist(store, &report)?;
        Ok(report)
    }

    /// Write forecasts, opportunities and metadata for a finished run.
    pub fn persist(&self, store: &dyn KvStore, report: &RunReport) -> Result<()> {
        let meta = &report.metadata;

        set_json(
            store,
            keys::ALL_FORECASTS,
            &ForecastReport {
                run_id: meta.run_id.clone(),
                forecasts: report
                    .entities
                    .iter()
                    .map(|r| r.forecast_record.clone())
                    .collect(),
                horizon_days: meta.horizon_days,
                timestamp: meta.timestamp,
            },
        )?;
        set_json(
            store,
            keys::FORECAST_METADATA,
            &serde_json::json!({
                "run_id": meta.run_id,
                "timestamp": meta.timestamp,
                "duration_seconds": meta.duration_seconds,
                "status": meta.status,
                "horizon_days": meta.horizon_days,
            }),
        )?;
        set_json(
            store,
            keys::ALPHA_OPPORTUNITIES,
            &OpportunityReport {
                run_id: meta.run_id.clone(),
                ranked: report.ranked.clone(),
                monte_carlo_iterations: meta.monte_carlo_iterations,
            },
        )?;
        set_json(store, keys::SIMULATION_METADATA, meta)?;

        debug!(run_id = %meta.run_id, "run outputs persisted");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_config::BoundRange;
    use crate::simulation::FixedTerminals;
    use crate::store::MemoryStore;
    use crate::types::{EntityDescriptor, RiskLevel};
    use chrono::NaiveDate;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    /// Twelve rising observations ending exactly at `last`.
    fn rising_to(last: f64) -> ObservationSeries {
        let values: Vec<f64> = (0..12).map(|i| last - 11.0 + i as f64).collect();
        ObservationSeries::daily(start(), &values)
    }

    fn noisy_series(len: usize, base: f64, slope: f64) -> ObservationSeries {
        let values: Vec<f64> = (0..len)
            .map(|i| base + slope * i as f64 + if i % 2 == 0 { 1.5 } else { -1.5 })
            .collect();
        ObservationSeries::daily(start(), &values)
    }

    fn config_for(names: &[&str]) -> EngineConfig {
        EngineConfig {
            entities: names.iter().map(|n| EntityDescriptor::new(*n, "")).collect(),
            monte_carlo_iterations: 300,
            seed: Some(42),
            ..EngineConfig::default()
        }
    }

    fn input(name: &str, obs: Option<ObservationSeries>, counts: Option<&[u64]>) -> EntityInput {
        EntityInput {
            entity_name: name.to_string(),
            observations: obs,
            counts: counts.map(CountSeries::from_counts),
        }
    }

    #[test]
    fn fixed_terminals_rank_by_alpha_above_threshold() {
        let config = EngineConfig::default();
        // Starting value is 50 for every entity.
        let cases = [
            ("entity1", vec![55.0, 65.0]), // +20 %
            ("entity2", vec![50.0, 60.0]), // +10 %
            ("entity3", vec![60.0, 70.0]), // +30 %
        ];

        let mut candidates = Vec::new();
        for (name, terminals) in cases {
            let mut sampler = FixedTerminals(terminals);
            let eval = forecast_and_simulate(name, &rising_to(50.0), None, &config, &mut sampler)
                .unwrap();
            candidates.push(eval.opportunity);
        }

        let returns: Vec<f64> = candidates.iter().map(|o| o.expected_return_pct.round()).collect();
        assert_eq!(returns, vec![20.0, 10.0, 30.0]);

        let ranked = rank(candidates, 15.0);
        let opp: Vec<&str> = ranked.opportunities.iter().map(|o| o.entity_name.as_str()).collect();
        let all: Vec<&str> = ranked.all_evaluations.iter().map(|o| o.entity_name.as_str()).collect();
        assert_eq!(opp, vec!["entity3", "entity1"]);
        assert_eq!(all, vec!["entity3", "entity1", "entity2"]);
        assert!(ranked
            .all_evaluations
            .windows(2)
            .all(|w| w[0].alpha_score >= w[1].alpha_score));
    }

    #[test]
    fn five_counts_omit_rating_but_keep_activity_path() {
        let config = config_for(&["VALE"]);
        let mut sampler = RandomWalkSampler::new(entity_rng(Some(1), 0));
        let eval = forecast_and_simulate(
            "VALE",
            &noisy_series(30, 40.0, 0.3),
            Some(&CountSeries::from_counts(&[20, 21, 22, 23, 24])),
            &config,
            &mut sampler,
        )
        .unwrap();

        let opp = &eval.opportunity;
        assert!(eval.momentum.is_none());
        assert!(opp.rating.is_none());
        assert!(opp.job_momentum.is_none());
        assert!(opp.expected_return_pct.is_finite());
        assert!(matches!(
            opp.risk_level,
            RiskLevel::Low | RiskLevel::Medium | RiskLevel::High
        ));
    }

    #[test]
    fn short_observations_skip_entity_only() {
        let coordinator = PipelineCoordinator::new(config_for(&["A", "B"]));
        let inputs = vec![
            input("A", Some(noisy_series(9, 50.0, 0.2)), Some(&[30, 30, 30, 20, 20, 20])),
            input("B", Some(noisy_series(30, 50.0, 0.2)), None),
        ];
        let reports = coordinator.evaluate_sequential(&inputs);

        assert!(matches!(reports[0].status, EntityStatus::Skipped { .. }));
        assert!(reports[0].evaluation.is_none());
        // The forecast-stage record still carries the job signal.
        assert!(reports[0].forecast_record.jobs.is_some());
        assert!(reports[0].forecast_record.activity.is_none());

        assert_eq!(reports[1].status, EntityStatus::Evaluated);
        assert!(reports[1].evaluation.is_some());
    }

    #[test]
    fn zero_start_value_fails_without_aborting_others() {
        let coordinator = PipelineCoordinator::new(config_for(&["ZERO", "OK"]));
        let zeros = ObservationSeries::daily(start(), &[0.0; 12]);
        let inputs = vec![
            input("ZERO", Some(zeros), None),
            input("OK", Some(noisy_series(20, 60.0, 0.1)), None),
        ];
        let reports = coordinator.evaluate_sequential(&inputs);
        assert!(matches!(reports[0].status, EntityStatus::Failed { .. }));
        assert_eq!(reports[1].status, EntityStatus::Evaluated);
    }

    #[test]
    fn missing_observations_are_skipped() {
        let coordinator = PipelineCoordinator::new(config_for(&["GHOST"]));
        let reports = coordinator.evaluate_sequential(&[input("GHOST", None, None)]);
        assert!(matches!(reports[0].status, EntityStatus::Skipped { .. }));
    }

    #[tokio::test]
    async fn parallel_matches_sequential_with_seed() {
        let mut config = config_for(&["A", "B", "C", "D"]);
        let inputs = vec![
            input("A", Some(noisy_series(30, 40.0, 0.5)), Some(&[30, 28, 27, 20, 20, 19])),
            input("B", Some(noisy_series(30, 70.0, -0.4)), Some(&[10, 10, 10, 20, 20, 20])),
            input("C", Some(noisy_series(30, 50.0, 0.0)), None),
            input("D", Some(noisy_series(8, 50.0, 0.0)), None),
        ];

        let sequential = PipelineCoordinator::new(config.clone()).evaluate(inputs.clone()).await;
        config.parallel = true;
        let parallel = PipelineCoordinator::new(config).evaluate(inputs).await;

        let strip = |r: &RankedOpportunities| -> Vec<(String, f64)> {
            r.all_evaluations
                .iter()
                .map(|o| (o.entity_name.clone(), o.alpha_score))
                .collect()
        };
        assert_eq!(strip(&sequential.ranked), strip(&parallel.ranked));
        assert_eq!(sequential.metadata.snapshot_digest, parallel.metadata.snapshot_digest);
        assert_eq!(parallel.metadata.entities_evaluated, 3);
        assert_eq!(parallel.metadata.entities_skipped, 1);
        assert_eq!(parallel.entities[3].entity_name, "D");
    }

    #[tokio::test]
    async fn blocking_sequential_matches_inline_sequential() {
        let coordinator = PipelineCoordinator::new(config_for(&["A", "B", "C"]));
        let inputs = vec![
            input("A", Some(noisy_series(30, 40.0, 0.5)), Some(&[30, 28, 27, 20, 20, 19])),
            input("B", None, None),
            input("C", Some(noisy_series(30, 60.0, -0.2)), None),
        ];

        let inline = coordinator.evaluate_sequential(&inputs);
        let blocking = coordinator.evaluate_sequential_blocking(inputs).await;

        let names: Vec<&str> = blocking.iter().map(|r| r.entity_name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
        assert!(matches!(blocking[1].status, EntityStatus::Skipped { .. }));
        for (a, b) in inline.iter().zip(&blocking) {
            assert_eq!(
                a.evaluation.as_ref().map(|e| e.opportunity.alpha_score),
                b.evaluation.as_ref().map(|e| e.opportunity.alpha_score)
            );
        }
    }

    #[tokio::test]
    async fn run_reads_store_and_persists_outputs() {
        let store = MemoryStore::new();
        let activity = serde_json::json!({
            "observations": noisy_series(30, 45.0, 0.4)
                .points
                .iter()
                .map(|p| serde_json::json!({"date": p.date, "activity_score": p.value}))
                .collect::<Vec<_>>(),
            "source": "test"
        });
        let jobs = serde_json::json!({
            "job_postings": [
                {"month": "2024-06", "count": 30}, {"month": "2024-05", "count": 29},
                {"month": "2024-04", "count": 31}, {"month": "2024-03", "count": 22},
                {"month": "2024-02", "count": 21}, {"month": "2024-01", "count": 20}
            ]
        });
        set_json(&store, &keys::raw_activity("VALE"), &activity).unwrap();
        set_json(&store, &keys::raw_jobs("VALE"), &jobs).unwrap();
        store.set(&keys::raw_activity("BHP"), "{ broken").unwrap();

        let coordinator = PipelineCoordinator::new(config_for(&["VALE", "BHP"]));
        let report = coordinator.run(&store).await.unwrap();

        assert_eq!(report.metadata.entities_total, 2);
        assert_eq!(report.metadata.entities_evaluated, 1);
        assert_eq!(report.metadata.entities_skipped, 1);
        assert_eq!(report.metadata.status, "success");
        assert_eq!(report.metadata.snapshot_digest.len(), 64);

        let stored: OpportunityReport = get_json(&store, keys::ALPHA_OPPORTUNITIES).unwrap().unwrap();
        assert_eq!(stored.ranked.all_evaluations.len(), 1);
        assert_eq!(stored.ranked.all_evaluations[0].entity_name, "VALE");
        assert!(stored.ranked.all_evaluations[0].rating.is_some());
        assert_eq!(stored.monte_carlo_iterations, 300);

        let forecasts: ForecastReport = get_json(&store, keys::ALL_FORECASTS).unwrap().unwrap();
        assert_eq!(forecasts.forecasts.len(), 2);
        assert_eq!(forecasts.forecasts[0].activity.as_ref().unwrap().points.len(), 30);

        let meta: RunMetadata = get_json(&store, keys::SIMULATION_METADATA).unwrap().unwrap();
        assert_eq!(meta.run_id, report.metadata.run_id);
        assert!(store.get(keys::FORECAST_METADATA).unwrap().is_some());
    }

    #[test]
    fn digest_tracks_input_changes() {
        let a = vec![input("A", Some(noisy_series(12, 50.0, 0.1)), None)];
        let b = vec![input("A", Some(noisy_series(12, 50.0, 0.2)), None)];
        assert_eq!(snapshot_digest(&a), snapshot_digest(&a.clone()));
        assert_ne!(snapshot_digest(&a), snapshot_digest(&b));
    }

    #[test]
    fn digest_respects_field_boundaries() {
        let split = vec![input("A", None, None), input("", None, None)];
        let joined = vec![input("Anullnull", None, None)];
        assert_ne!(snapshot_digest(&split), snapshot_digest(&joined));
    }

    #[test]
    fn inverted_bounds_fail_entities_without_panicking() {
        let mut config = config_for(&["A", "B"]);
        config.bound_range = BoundRange::new(100.0, 0.0);
        let coordinator = PipelineCoordinator::new(config);
        let inputs = vec![
            input("A", Some(noisy_series(20, 50.0, 0.2)), None),
            input("B", Some(noisy_series(20, 60.0, -0.2)), None),
        ];
        let reports = coordinator.evaluate_sequential(&inputs);
        assert_eq!(reports.len(), 2);
        assert!(reports
            .iter()
            .all(|r| matches!(r.status, EntityStatus::Failed { .. })));
    }

    #[tokio::test]
    async fn run_budget_marks_unfinished_entities_failed() {
        let names = ["A", "B", "C", "D"];
        let mut config = config_for(&names);
        config.parallel = true;
        config.max_run_secs = Some(0);
        config.monte_carlo_iterations = 200_000;

        let inputs: Vec<EntityInput> = names
            .iter()
            .map(|n| input(n, Some(noisy_series(30, 50.0, 0.3)), None))
            .collect();
        let report = PipelineCoordinator::new(config).evaluate(inputs).await;

        let order: Vec<&str> = report.entities.iter().map(|r| r.entity_name.as_str()).collect();
        assert_eq!(order, names.to_vec());

        let budget_failure = EntityStatus::Failed {
            reason: "run budget exceeded".to_string(),
        };
        assert!(report
            .entities
            .iter()
            .all(|r| r.status == EntityStatus::Evaluated || r.status == budget_failure));
        assert!(report.entities.iter().any(|r| r.status == budget_failure));
        assert!(report.metadata.entities_failed >= 1);
        assert_eq!(report.metadata.status, "partial");
    }
}
