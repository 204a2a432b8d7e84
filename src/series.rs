// =============================================================================
// Input Series — activity observations and job-posting counts
// =============================================================================
//
// Two input shapes feed the engine:
//
//   ObservationSeries  oldest-first (date, value) pairs, one metric per entity
//   CountSeries        most-recent-first (period, count) pairs
//
// The raw record types mirror what the ingestion collaborator writes under
// `raw:satellite:{entity}` and `raw:jobs:{entity}`; extra fields are ignored.
// =============================================================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// =============================================================================
// ObservationSeries
// =============================================================================

/// A single dated observation of an entity's activity metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
}

/// Ordered (oldest first) observations for one entity and one metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationSeries {
    pub points: Vec<Observation>,
}

impl ObservationSeries {
    pub fn new(points: Vec<Observation>) -> Self {
        Self { points }
    }

    /// Build a daily series starting at `start` from plain values.
    pub fn daily(start: NaiveDate, values: &[f64]) -> Self {
        let points = values
            .iter()
            .zip(start.iter_days())
            .map(|(&value, date)| Observation { date, value })
            .collect();
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn last(&self) -> Option<&Observation> {
        self.points.last()
    }
}

// =============================================================================
// CountSeries
// =============================================================================

/// One period's integer count (e.g. job postings in a month).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountPoint {
    pub period: String,
    pub count: u64,
}

/// Counts ordered most-recent-first: the head is always "current".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountSeries {
    pub points: Vec<CountPoint>,
}

impl CountSeries {
    pub fn new(points: Vec<CountPoint>) -> Self {
        Self { points }
    }

    /// Build a series from plain counts, most recent first, with synthetic
    /// period labels `t-0`, `t-1`, ...
    pub fn from_counts(counts: &[u64]) -> Self {
        let points = counts
            .iter()
            .enumerate()
            .map(|(i, &count)| CountPoint {
                period: format!("t-{i}"),
                count,
            })
            .collect();
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn counts(&self) -> Vec<u64> {
        self.points.iter().map(|p| p.count).collect()
    }
}

// =============================================================================
// Raw collaborator records
// =============================================================================

/// One satellite/OSINT observation as written by the ingestion collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawObservation {
    pub date: NaiveDate,
    pub activity_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_cover: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// `raw:satellite:{entity}` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawActivityRecord {
    #[serde(default)]
    pub observations: Vec<RawObservation>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl From<&RawActivityRecord> for ObservationSeries {
    fn from(raw: &RawActivityRecord) -> Self {
        let points = raw
            .observations
            .iter()
            .map(|o| Observation {
                date: o.date,
                value: o.activity_score,
            })
            .collect();
        Self { points }
    }
}

/// One month of job postings as written by the ingestion collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawJobPosting {
    pub month: String,
    pub count: u64,
}

/// `raw:jobs:{entity}` payload (postings most recent first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawJobsRecord {
    #[serde(default)]
    pub entity_name: Option<String>,
    #[serde(default)]
    pub job_postings: Vec<RawJobPosting>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl From<&RawJobsRecord> for CountSeries {
    fn from(raw: &RawJobsRecord) -> Self {
        let points = raw
            .job_postings
            .iter()
            .map(|p| CountPoint {
                period: p.month.clone(),
                count: p.count,
            })
            .collect();
        Self { points }
    }
}
