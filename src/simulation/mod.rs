// =============================================================================
// Simulation Module
// =============================================================================
//
// Stochastic projection of a forecast into a terminal-value distribution.

pub mod monte_carlo;

pub use monte_carlo::{
    rng_from_seed, summarize_terminals, FixedTerminals, MonteCarloProjector, RandomWalkSampler,
    SimulationParams, SimulationResult, TerminalSampler, VOLATILITY_FLOOR,
};
