//! Rate limit service handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::client::ClientIdentity;
use super::middleware::RateLimitRejection;
use crate::ratelimit::{now_millis, RateLimitEntry, RateLimitPreset, RateLimitResult, RateLimiter};

/// Shared state for the rate limit handlers.
#[derive(Clone)]
pub struct AppState {
    /// The rate limiter instance
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

/// Body of `POST /v1/check`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckRequest {
    /// Endpoint tag to charge
    pub endpoint: String,
    /// Preset name; unknown or missing names use the default preset
    #[serde(default)]
    pub preset: Option<String>,
    /// Explicit client identity; defaults to the caller's
    #[serde(default)]
    pub client: Option<String>,
}

/// Query of `GET /v1/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusQuery {
    pub endpoint: String,
    #[serde(default)]
    pub client: Option<String>,
}

/// Errors returned by the handlers.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    RateLimited(RateLimitRejection),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::RateLimited(rejection) => return rejection.into_response(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Effective preset table.
pub async fn list_presets(
    State(state): State<AppState>,
) -> Json<BTreeMap<&'static str, RateLimitPreset>> {
    Json(state.limiter.presets().to_map())
}

/// Consume one request from a quota.
#[instrument(skip_all, fields(endpoint = %request.endpoint))]
pub async fn check(
    State(state): State<AppState>,
    ClientIdentity(caller): ClientIdentity,
    Json(request): Json<CheckRequest>,
) -> Result<Json<RateLimitResult>, ApiError> {
    if request.endpoint.is_empty() {
        warn!("Received rate limit check with empty endpoint");
        return Err(ApiError::BadRequest("endpoint is required".to_string()));
    }

    let client = request.client.unwrap_or(caller);
    let preset = state
        .limiter
        .preset(request.preset.as_deref().unwrap_or("default"));

    let now = now_millis();
    let result = state.limiter.check(&client, &request.endpoint, &preset, now);

    info!(
        client = %client,
        allowed = result.allowed,
        remaining = result.remaining,
        "Rate limit decision made"
    );

    if !result.allowed {
        return Err(ApiError::RateLimited(RateLimitRejection::from_result(
            &result,
            preset.max_requests,
            now,
        )));
    }
    Ok(Json(result))
}

/// Inspect a quota without consuming it.
pub async fn status(
    State(state): State<AppState>,
    ClientIdentity(caller): ClientIdentity,
    Query(query): Query<StatusQuery>,
) -> Result<Json<RateLimitEntry>, ApiError> {
    let client = query.client.unwrap_or(caller);
    state
        .limiter
        .get_rate_limit_status(&query.endpoint, &client)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no rate limit entry for {}", client)))
}

/// Drop a quota entry.
pub async fn reset(
    State(state): State<AppState>,
    Path((endpoint, client)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    if state.limiter.reset_rate_limit(&endpoint, &client) {
        debug!(endpoint = %endpoint, client = %client, "Rate limit entry reset");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!(
            "no rate limit entry for {}:{}",
            endpoint, client
        )))
    }
}
