// =============================================================================
// Shared classification types used across the alpha engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Direction of a job-posting momentum signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MomentumTrend {
    Expansion,
    Contraction,
    Stable,
}

impl std::fmt::Display for MomentumTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expansion => write!(f, "expansion"),
            Self::Contraction => write!(f, "contraction"),
            Self::Stable => write!(f, "stable"),
        }
    }
}

/// How much of the simulated distribution ended above the starting value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// > 70% → high, > 55% → medium, otherwise low.
    pub fn from_probability_positive(probability_positive: f64) -> Self {
        if probability_positive > 70.0 {
            Self::High
        } else if probability_positive > 55.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Dispersion bucket of the simulated terminal values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// < 10% → low, < 20% → medium, otherwise high.
    pub fn from_volatility_pct(volatility_pct: f64) -> Self {
        if volatility_pct < 10.0 {
            Self::Low
        } else if volatility_pct < 20.0 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Directional outlook blended from trend strength and job momentum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "bullish"),
            Self::Bearish => write!(f, "bearish"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// Descriptor of one monitored entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    #[serde(default)]
    pub kind: String,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }
}
