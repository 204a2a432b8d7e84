// =============================================================================
// Synthetic Collector — simulated activity and job-posting feeds
// =============================================================================
//
// Stands in for the ingestion collaborator when no live feeds are wired up.
// Per entity:
//
//   activity[t] = clip(baseline + slope · t + noise[t], 0, 100)
//       baseline ~ N(50, 10), slope ~ N(0, 0.5), noise ~ N(0, 5)
//       one observation per day, ending yesterday
//
//   jobs[m] = max(0, Poisson(25) + N(0, 5)), most recent month first
//
// Output uses the same raw record layout as live collectors, so the pipeline
// cannot tell the difference.
// =============================================================================

use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use rand::Rng;
use rand_distr::{Distribution, Normal, Poisson, Uniform};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::runtime_config::BoundRange;
use crate::series::{RawActivityRecord, RawJobPosting, RawJobsRecord, RawObservation};
use crate::store::{keys, set_json, KvStore};
use crate::types::EntityDescriptor;

pub const ACTIVITY_SOURCE: &str = "satellite_simulation";
pub const JOBS_SOURCE: &str = "job_postings_simulation";

/// `raw:metadata:last_collection` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub timestamp: chrono::DateTime<Utc>,
    pub duration_seconds: f64,
    pub status: String,
    pub entities: usize,
}

pub struct SyntheticCollector<R: Rng> {
    rng: R,
    lookback_days: usize,
    job_months: usize,
}

impl<R: Rng> SyntheticCollector<R> {
    pub fn new(rng: R, lookback_days: usize, job_months: usize) -> Self {
        Self {
            rng,
            lookback_days,
            job_months,
        }
    }

    /// Daily activity observations for the `lookback_days` before `today`.
    pub fn activity_record(&mut self, today: NaiveDate) -> Result<RawActivityRecord> {
        let baseline = Normal::new(50.0, 10.0).context("baseline distribution")?;
        let slope = Normal::new(0.0, 0.5).context("slope distribution")?;
        let noise = Normal::new(0.0, 5.0).context("noise distribution")?;
        let cloud = Uniform::new(0.0, 30.0);
        let confidence = Uniform::new(0.7, 1.0);
        let bounds = BoundRange::default();

        let base = baseline.sample(&mut self.rng);
        let trend = slope.sample(&mut self.rng);
        let days = self.lookback_days;

        let observations = (0..days)
            .map(|i| {
                let score = base + trend * i as f64 + noise.sample(&mut self.rng);
                RawObservation {
                    date: today - Duration::days((days - i) as i64),
                    activity_score: bounds.clip(score),
                    cloud_cover: Some(cloud.sample(&mut self.rng)),
                    confidence: Some(confidence.sample(&mut self.rng)),
                }
            })
            .collect();

        Ok(RawActivityRecord {
            observations,
            timestamp: Some(Utc::now().to_rfc3339()),
            source: Some(ACTIVITY_SOURCE.to_string()),
        })
    }

    /// Monthly job-posting counts, most recent first.
    pub fn jobs_record(&mut self, entity_name: &str, today: NaiveDate) -> Result<RawJobsRecord> {
        let poisson = Poisson::new(25.0).context("posting distribution")?;
        let jitter = Normal::new(0.0, 5.0).context("jitter distribution")?;

        let job_postings = (0..self.job_months)
            .map(|i| {
                let month = today - Duration::days(30 * i as i64);
                let posted: f64 = poisson.sample(&mut self.rng);
                let raw = posted + jitter.sample(&mut self.rng);
                RawJobPosting {
                    month: month.format("%Y-%m").to_string(),
                    count: raw.max(0.0) as u64,
                }
            })
            .collect();

        Ok(RawJobsRecord {
            entity_name: Some(entity_name.to_string()),
            job_postings,
            timestamp: Some(Utc::now().to_rfc3339()),
            source: Some(JOBS_SOURCE.to_string()),
        })
    }

    /// Generate and store both feeds for every entity, then stamp the
    /// collection metadata.
    pub fn collect(&mut self, store: &dyn KvStore, entities: &[EntityDescriptor]) -> Result<CollectionMetadata> {
        let started = Instant::now();
        let today = Utc::now().date_naive();

        for entity in entities {
            let name = entity.name.as_str();
            let activity = self.activity_record(today)?;
            set_json(store, &keys::raw_activity(name), &activity)?;
            let jobs = self.jobs_record(name, today)?;
            set_json(store, &keys::raw_jobs(name), &jobs)?;
            debug!(
                entity = %name,
                kind = %entity.kind,
                days = activity.observations.len(),
                months = jobs.job_postings.len(),
                "synthetic feeds written"
            );
        }

        let metadata = CollectionMetadata {
            timestamp: Utc::now(),
            duration_seconds: started.elapsed().as_secs_f64(),
            status: "success".to_string(),
            entities: entities.len(),
        };
        set_json(store, keys::COLLECTION_METADATA, &metadata)?;

        info!(
            entities = entities.len(),
            duration_secs = format!("{:.2}", metadata.duration_seconds),
            "synthetic collection complete"
        );
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{check_stage, StageHealth};
    use crate::series::{CountSeries, ObservationSeries};
    use crate::simulation::rng_from_seed;
    use crate::store::{get_json, MemoryStore};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    #[test]
    fn activity_is_clipped_and_ends_yesterday() {
        let mut collector = SyntheticCollector::new(rng_from_seed(Some(3)), 30, 12);
        let record = collector.activity_record(today()).unwrap();

        assert_eq!(record.observations.len(), 30);
        assert_eq!(record.observations[0].date, NaiveDate::from_ymd_opt(2024, 5, 16).unwrap());
        assert_eq!(record.observations[29].date, NaiveDate::from_ymd_opt(2024, 6, 14).unwrap());
        assert!(record
            .observations
            .iter()
            .all(|o| (0.0..=100.0).contains(&o.activity_score)));
        assert!(record
            .observations
            .iter()
            .all(|o| o.confidence.map_or(false, |c| (0.7..1.0).contains(&c))));
    }

    #[test]
    fn jobs_are_most_recent_first() {
        let mut collector = SyntheticCollector::new(rng_from_seed(Some(3)), 30, 12);
        let record = collector.jobs_record("VALE", today()).unwrap();

        assert_eq!(record.job_postings.len(), 12);
        assert_eq!(record.job_postings[0].month, "2024-06");
        assert_eq!(record.job_postings[1].month, "2024-05");
        let mean = record.job_postings.iter().map(|p| p.count as f64).sum::<f64>() / 12.0;
        assert!(mean > 10.0 && mean < 40.0, "mean {mean}");
    }

    #[test]
    fn seeded_collection_is_reproducible() {
        let a = SyntheticCollector::new(rng_from_seed(Some(9)), 30, 12)
            .activity_record(today())
            .unwrap();
        let b = SyntheticCollector::new(rng_from_seed(Some(9)), 30, 12)
            .activity_record(today())
            .unwrap();
        let scores = |r: &RawActivityRecord| r.observations.iter().map(|o| o.activity_score).collect::<Vec<_>>();
        assert_eq!(scores(&a), scores(&b));
    }

    #[test]
    fn collect_writes_feeds_and_metadata() {
        let store = MemoryStore::new();
        let entities = vec![EntityDescriptor::new("VALE", "mining"), EntityDescriptor::new("EXXON", "energy")];
        let meta = SyntheticCollector::new(rng_from_seed(Some(1)), 30, 12)
            .collect(&store, &entities)
            .unwrap();
        assert_eq!(meta.entities, 2);

        let activity: RawActivityRecord = get_json(&store, &keys::raw_activity("EXXON")).unwrap().unwrap();
        assert_eq!(ObservationSeries::from(&activity).len(), 30);
        let jobs: RawJobsRecord = get_json(&store, &keys::raw_jobs("VALE")).unwrap().unwrap();
        assert_eq!(CountSeries::from(&jobs).len(), 12);

        let health = check_stage(&store, keys::COLLECTION_METADATA, Utc::now(), 2.0);
        assert!(matches!(health, StageHealth::Ok { .. }));
    }
}
