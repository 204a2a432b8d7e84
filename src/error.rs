// =============================================================================
// Evaluation errors — per-entity, never fatal to a batch
// =============================================================================

use serde::{Deserialize, Serialize};

/// Which series failed its length precondition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    /// Activity observations feeding the trend forecaster.
    Observations,
    /// Job-posting counts feeding the momentum estimator.
    Counts,
}

impl std::fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Observations => write!(f, "observations"),
            Self::Counts => write!(f, "counts"),
        }
    }
}

/// Errors raised by the numerical core.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("insufficient {series}: need {required}, got {actual}")]
    InsufficientData {
        series: SeriesKind,
        required: usize,
        actual: usize,
    },

    #[error("non-finite value in {stage}")]
    NonFinite { stage: &'static str },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl EvalError {
    pub fn insufficient(series: SeriesKind, required: usize, actual: usize) -> Self {
        Self::InsufficientData {
            series,
            required,
            actual,
        }
    }

    /// True for the expected, local "not enough history" condition.
    pub fn is_insufficient(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}

pub type EvalResult<T> = std::result::Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_message_names_series() {
        let err = EvalError::insufficient(SeriesKind::Counts, 6, 5);
        assert_eq!(err.to_string(), "insufficient counts: need 6, got 5");
        assert!(err.is_insufficient());
        assert!(!EvalError::NonFinite { stage: "fit" }.is_insufficient());
    }
}
