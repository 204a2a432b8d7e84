// =============================================================================
// Alpha Engine — trend forecasting and Monte Carlo opportunity ranking
// =============================================================================
//
// Per entity: fit a linear trend to an observation series, measure momentum
// on a count series, project the trend forward with a Monte Carlo random
// walk, then score and rank every entity by a composite alpha.
//
// Entry points:
//   - pipeline::forecast_and_simulate   one entity, pure apart from the RNG
//   - pipeline::PipelineCoordinator     store-backed batch runs
//   - api::rest::router                 HTTP surface over a shared AppState
// =============================================================================

pub mod api;
pub mod app_state;
pub mod error;
pub mod forecast;
pub mod health;
pub mod pipeline;
pub mod runtime_config;
pub mod scoring;
pub mod series;
pub mod simulation;
pub mod stats;
pub mod store;
pub mod synthetic;
pub mod types;
