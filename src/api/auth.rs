// =============================================================================
// Bearer Token Authentication — Axum Extractor
// =============================================================================
//
// Validates `Authorization: Bearer <token>` against the admin token held in
// `AppState` (populated from `ALPHA_ADMIN_TOKEN` at startup).  Comparison is
// constant time.
//
//   async fn handler(_auth: AuthBearer, State(state): State<Arc<AppState>>)
//
// A missing or wrong token short-circuits with 403 before the handler runs.
// =============================================================================

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::app_state::AppState;

/// Compare two byte slices in constant time.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Proof that the request carried the admin token.
pub struct AuthBearer;

pub struct AuthRejection {
    status: StatusCode,
    message: &'static str,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, axum::Json(body)).into_response()
    }
}

/// Check `header` (the raw `Authorization` value) against `expected`.
pub fn check_bearer(header: Option<&str>, expected: Option<&str>) -> Result<(), AuthRejection> {
    let Some(expected) = expected else {
        warn!("ALPHA_ADMIN_TOKEN is not set, rejecting authenticated request");
        return Err(AuthRejection {
            status: StatusCode::FORBIDDEN,
            message: "Server authentication not configured",
        });
    };

    let Some(token) = header.and_then(|v| v.strip_prefix("Bearer ")) else {
        warn!("Missing or malformed Authorization header");
        return Err(AuthRejection {
            status: StatusCode::FORBIDDEN,
            message: "Missing or invalid authorization token",
        });
    };

    if !constant_time_eq(token.as_bytes(), expected.as_bytes()) {
        warn!("Invalid admin token presented");
        return Err(AuthRejection {
            status: StatusCode::FORBIDDEN,
            message: "Invalid authorization token",
        });
    }
    Ok(())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthBearer {
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = parts.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        check_bearer(header, state.admin_token.as_deref())?;
        Ok(AuthBearer)
    }
}
