// =============================================================================
// Trend Forecaster — OLS against the series index, residual bands
// =============================================================================
//
// Algorithm:
//   1. Require at least MIN_TREND_POINTS observations (hard precondition).
//   2. Fit value = slope · i + intercept for i in 0..n by ordinary least
//      squares:  slope = Σ((x-x̄)(y-ȳ)) / Σ((x-x̄)²),  intercept = ȳ - slope·x̄.
//   3. Evaluate the line at n..n+H-1 and clip each value to [lo, hi].
//   4. σ_resid = sample std of the training residuals; every point carries
//      predicted ± BAND_SIGMAS·σ_resid, each bound clipped independently.
//   5. trend_strength_pct compares the mean of the first TREND_WINDOW fitted
//      forecast values with the mean of the last TREND_WINDOW observations.
//      Averages (never single points) keep the metric from chasing noise.
//
// Forecast dates start the day after the last observation, one per day.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{EvalError, EvalResult, SeriesKind};
use crate::runtime_config::BoundRange;
use crate::series::ObservationSeries;
use crate::stats::{mean, population_std, sample_std};

/// Minimum number of observations required to fit a trend.
pub const MIN_TREND_POINTS: usize = 10;

/// Trailing / leading window used by trend strength and forecast volatility.
pub const TREND_WINDOW: usize = 7;

/// Width of the uncertainty band in residual standard deviations.
const BAND_SIGMAS: f64 = 2.0;

// =============================================================================
// Types
// =============================================================================

/// One forecast day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted_value: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

/// Result of fitting and extrapolating one observation series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    /// Exactly `horizon` points, one per day after the last observation.
    pub points: Vec<ForecastPoint>,
    /// Most recent observed value.
    pub current_value: f64,
    /// Mean of the fitted forecast values before clipping.
    pub forecast_mean: f64,
    /// Leading forecast average vs. trailing history average, in percent.
    pub trend_strength_pct: f64,
    /// R² of the fit on the training data.
    pub fit_quality: f64,
    /// Fitted slope per day.
    pub slope: f64,
    /// Sample standard deviation of the training residuals.
    pub residual_std: f64,
    pub created_at: DateTime<Utc>,
}

impl ForecastResult {
    /// Population std of the first `TREND_WINDOW` clipped forecast values.
    ///
    /// This is the volatility handed to the Monte Carlo projector.
    pub fn leading_volatility(&self) -> f64 {
        let window: Vec<f64> = self
            .points
            .iter()
            .take(TREND_WINDOW)
            .map(|p| p.predicted_value)
            .collect();
        population_std(&window).unwrap_or(0.0)
    }
}

/// Closed-form least-squares line over the index variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl LinearFit {
    pub fn at(&self, index: f64) -> f64 {
        self.slope * index + self.intercept
    }
}

// =============================================================================
// Fitting
// =============================================================================

/// Fit `value = slope · index + intercept` to `values`.
///
/// Needs at least two points. A non-finite input or coefficient is reported as
/// [`EvalError::NonFinite`].
pub fn fit_linear(values: &[f64]) -> EvalResult<LinearFit> {
    if values.len() < 2 {
        return Err(EvalError::insufficient(SeriesKind::Observations, 2, values.len()));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(EvalError::NonFinite { stage: "trend input" });
    }

    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;

    let mut numerator = 0.0_f64;
    let mut denominator = 0.0_f64;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        numerator += dx * (y - y_mean);
        denominator += dx * dx;
    }

    let slope = numerator / denominator;
    let intercept = y_mean - slope * x_mean;
    if !slope.is_finite() || !intercept.is_finite() {
        return Err(EvalError::NonFinite { stage: "trend fit" });
    }

    let mut ss_res = 0.0_f64;
    let mut ss_tot = 0.0_f64;
    for (i, &y) in values.iter().enumerate() {
        let fitted = slope * i as f64 + intercept;
        ss_res += (y - fitted).powi(2);
        ss_tot += (y - y_mean).powi(2);
    }

    // A flat series is fitted perfectly; R² is 1 rather than 0/0.
    let r_squared = if ss_tot > f64::EPSILON {
        1.0 - ss_res / ss_tot
    } else if ss_res > f64::EPSILON {
        0.0
    } else {
        1.0
    };

    Ok(LinearFit {
        slope,
        intercept,
        r_squared,
    })
}

// =============================================================================
// Forecasting
// =============================================================================

/// Fit a trend to `series` and extrapolate it `horizon` days ahead.
pub fn forecast_trend(
    series: &ObservationSeries,
    horizon: usize,
    bounds: BoundRange,
) -> EvalResult<ForecastResult> {
    if series.len() < MIN_TREND_POINTS {
        trace!(len = series.len(), min = MIN_TREND_POINTS, "trend: insufficient data");
        return Err(EvalError::insufficient(
            SeriesKind::Observations,
            MIN_TREND_POINTS,
            series.len(),
        ));
    }
    if horizon == 0 {
        return Err(EvalError::InvalidInput("horizon must be at least 1".into()));
    }
    if !bounds.is_valid() {
        return Err(EvalError::InvalidInput(format!(
            "bound range [{}, {}] is not ordered",
            bounds.lo, bounds.hi
        )));
    }

    let values = series.values();
    let fit = fit_linear(&values)?;
    let n = values.len();

    let residuals: Vec<f64> = values
        .iter()
        .enumerate()
        .map(|(i, &y)| y - fit.at(i as f64))
        .collect();
    let residual_std = sample_std(&residuals).unwrap_or(0.0);
    let half_band = BAND_SIGMAS * residual_std;

    let raw: Vec<f64> = (n..n + horizon).map(|i| fit.at(i as f64)).collect();
    if raw.iter().any(|v| !v.is_finite()) {
        return Err(EvalError::NonFinite { stage: "trend extrapolation" });
    }

    let last_date = match series.last() {
        Some(obs) => obs.date,
        None => return Err(EvalError::insufficient(SeriesKind::Observations, MIN_TREND_POINTS, 0)),
    };

    let points: Vec<ForecastPoint> = raw
        .iter()
        .enumerate()
        .map(|(step, &value)| ForecastPoint {
            date: last_date + Duration::days(step as i64 + 1),
            predicted_value: bounds.clip(value),
            lower_bound: bounds.clip(value - half_band),
            upper_bound: bounds.clip(value + half_band),
        })
        .collect();

    // Trend strength uses the fitted (pre-clip) leading values.
    let trailing = mean(&values[n - TREND_WINDOW.min(n)..]).unwrap_or(0.0);
    let leading = mean(&raw[..TREND_WINDOW.min(raw.len())]).unwrap_or(0.0);
    let trend_strength_pct = if trailing.abs() > f64::EPSILON {
        (leading - trailing) / trailing * 100.0
    } else {
        0.0
    };

    let forecast_mean = mean(&raw).unwrap_or(0.0);
    let current_value = values[n - 1];

    if !trend_strength_pct.is_finite() || !fit.r_squared.is_finite() {
        return Err(EvalError::NonFinite { stage: "trend metrics" });
    }

    trace!(
        slope = format!("{:.4}", fit.slope),
        r2 = format!("{:.4}", fit.r_squared),
        trend_strength_pct = format!("{:.2}", trend_strength_pct),
        residual_std = format!("{:.4}", residual_std),
        "trend forecast computed"
    );

    Ok(ForecastResult {
        points,
        current_value,
        forecast_mean,
        trend_strength_pct,
        fit_quality: fit.r_squared,
        slope: fit.slope,
        residual_std,
        created_at: Utc::now(),
    })
}
