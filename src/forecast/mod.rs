// =============================================================================
// Forecast Module
// =============================================================================
//
// Per-entity signals derived from raw series:
// - Linear trend forecast with residual uncertainty bands (activity)
// - Moving-average momentum (job postings)

pub mod momentum;
pub mod trend;

pub use momentum::{classify_momentum, estimate_momentum, MomentumResult, MIN_MOMENTUM_POINTS};
pub use trend::{
    fit_linear, forecast_trend, ForecastPoint, ForecastResult, LinearFit, MIN_TREND_POINTS,
    TREND_WINDOW,
};
