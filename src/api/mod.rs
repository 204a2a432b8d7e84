// =============================================================================
// HTTP API
// =============================================================================
//
// - REST endpoints under /api/v1/ (results, run trigger, health)
// - Bearer-token extractor for the authenticated routes

pub mod auth;
pub mod rest;
