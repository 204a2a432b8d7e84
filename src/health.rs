// =============================================================================
// Health Check — freshness of every pipeline stage
// =============================================================================
//
// Each stage leaves a metadata record with a `timestamp`.  A stage is healthy
// when that timestamp is younger than `staleness_hours`; the system is
// healthy only when every stage is.  The report is written back to the store
// under `system:health_status` so dashboards can read it without recomputing.
// =============================================================================

use std::fmt;

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::store::{keys, set_json, KvStore};

/// Stage name → metadata key.
pub const STAGES: [(&str, &str); 3] = [
    ("collection", keys::COLLECTION_METADATA),
    ("forecasting", keys::FORECAST_METADATA),
    ("simulation", keys::SIMULATION_METADATA),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StageHealth {
    Ok { age_hours: f64 },
    Stale { age_hours: f64 },
    Missing,
    Error { message: String },
}

impl StageHealth {
    pub fn is_ok(&self) -> bool {
        matches!(self, StageHealth::Ok { .. })
    }
}

impl fmt::Display for StageHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageHealth::Ok { age_hours } => write!(f, "OK ({age_hours:.1}h ago)"),
            StageHealth::Stale { age_hours } => write!(f, "Stale ({age_hours:.1}h)"),
            StageHealth::Missing => write!(f, "No data"),
            StageHealth::Error { message } => write!(f, "Error: {message}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Overall {
    Healthy,
    Degraded,
}

impl fmt::Display for Overall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Overall::Healthy => write!(f, "healthy"),
            Overall::Degraded => write!(f, "degraded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCheck {
    pub stage: String,
    #[serde(flatten)]
    pub health: StageHealth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub checks: Vec<StageCheck>,
    pub overall: Overall,
}

/// Accepts RFC 3339 or a naive ISO-8601 timestamp (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Freshness of one metadata record.
pub fn check_stage(store: &dyn KvStore, key: &str, now: DateTime<Utc>, staleness_hours: f64) -> StageHealth {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return StageHealth::Missing,
        Err(e) => return StageHealth::Error { message: e.to_string() },
    };

    let value: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => return StageHealth::Error { message: e.to_string() },
    };
    let Some(ts) = value
        .get("timestamp")
        .and_then(|t| t.as_str())
        .and_then(parse_timestamp)
    else {
        return StageHealth::Error {
            message: "missing or unparsable timestamp".into(),
        };
    };

    let age_hours = (now - ts).num_milliseconds() as f64 / 3_600_000.0;
    if age_hours < staleness_hours {
        StageHealth::Ok { age_hours }
    } else {
        StageHealth::Stale { age_hours }
    }
}

/// Check every stage as of `now`.
pub fn check_health(store: &dyn KvStore, staleness_hours: f64, now: DateTime<Utc>) -> HealthReport {
    let checks: Vec<StageCheck> = STAGES
        .iter()
        .map(|(stage, key)| StageCheck {
            stage: stage.to_string(),
            health: check_stage(store, key, now, staleness_hours),
        })
        .collect();

    let overall = if checks.iter().all(|c| c.health.is_ok()) {
        Overall::Healthy
    } else {
        Overall::Degraded
    };

    HealthReport {
        timestamp: now,
        checks,
        overall,
    }
}

/// Check every stage now, log the result and persist the report.
pub fn run_health_check(store: &dyn KvStore, staleness_hours: f64) -> Result<HealthReport> {
    let report = check_health(store, staleness_hours, Utc::now());

    for check in &report.checks {
        if check.health.is_ok() {
            info!(stage = %check.stage, status = %check.health, "health check");
        } else {
            warn!(stage = %check.stage, status = %check.health, "health check");
        }
    }
    info!(overall = %report.overall, "system health");

    set_json(store, keys::HEALTH_STATUS, &report)?;
    Ok(report)
}
