//! Request handlers.

pub mod events;
pub mod jobs;

use axum::extract::{FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the caller's identity. Authentication happens upstream.
pub const OWNER_HEADER: &str = "x-owner-id";

/// The calling owner, from [`OWNER_HEADER`] or an `owner` query parameter
/// (browsers cannot set headers on `EventSource`).
#[derive(Debug, Clone)]
pub struct Owner(pub String);

#[derive(Deserialize)]
struct OwnerQuery {
    owner: Option<String>,
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let from_header = parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let owner = match from_header {
            Some(owner) => Some(owner),
            None => Query::<OwnerQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|q| q.0.owner)
                .filter(|v| !v.trim().is_empty()),
        };
        owner
            .map(Owner)
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {} header", OWNER_HEADER)))
    }
}

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SerpLoadResponse {
    /// Tickets granted within the current window.
    pub current_load: u32,
    pub max_qps: u32,
}

/// Current occupancy of the shared SERP rate-limit window.
pub async fn serp_load(State(state): State<AppState>) -> Result<Json<SerpLoadResponse>, ApiError> {
    let current_load = state.limiter.current_load().await?;
    Ok(Json(SerpLoadResponse {
        current_load,
        max_qps: state.limiter.max_qps(),
    }))
}
