// =============================================================================
// Scoring Module
// =============================================================================
//
// - Composite alpha scoring with confidence / risk / outlook classification
// - Threshold filtering and deterministic ranking

pub mod ranking;
pub mod scorer;

pub use ranking::{rank, RankedOpportunities};
pub use scorer::{Opportunity, OpportunityScorer, Outlook};
