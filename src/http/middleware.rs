//! Rate limiting middleware for axum.
//!
//! Every request passing through the layer consumes one slot from the
//! caller's quota for a fixed endpoint tag. Status is reported in the usual
//! headers:
//! - `X-RateLimit-Limit`: maximum requests in the window
//! - `X-RateLimit-Remaining`: requests left in the window
//! - `X-RateLimit-Reset`: epoch seconds when the window has room again
//! - `Retry-After`: seconds to wait (429 responses only)

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::RETRY_AFTER, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::debug;

use super::client::ClientIdentity;
use crate::ratelimit::{now_millis, RateLimitResult, RateLimiter};

/// Standard rate limit header names.
pub mod headers {
    use super::HeaderName;

    pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
    pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
    pub static X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
}

/// State for [`rate_limit_middleware`].
#[derive(Clone)]
pub struct RateLimitLayerState {
    limiter: Arc<RateLimiter>,
    endpoint: String,
    preset: String,
}

impl RateLimitLayerState {
    /// Limit requests under `endpoint` with the named preset.
    pub fn new(limiter: Arc<RateLimiter>, endpoint: &str, preset: &str) -> Self {
        Self {
            limiter,
            endpoint: endpoint.to_string(),
            preset: preset.to_string(),
        }
    }
}

/// Middleware admitting or rejecting a request against its caller's quota.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitLayerState>,
    ClientIdentity(client): ClientIdentity,
    request: Request,
    next: Next,
) -> Response {
    let now = now_millis();
    let preset = state.limiter.preset(&state.preset);
    let result = state.limiter.check(&client, &state.endpoint, &preset, now);

    if !result.allowed {
        debug!(
            client = %client,
            endpoint = %state.endpoint,
            "Request rejected by rate limit middleware"
        );
        return RateLimitRejection::from_result(&result, preset.max_requests, now).into_response();
    }

    let mut response = next.run(request).await;
    add_rate_limit_headers(
        response.headers_mut(),
        preset.max_requests,
        result.remaining,
        result.reset_at,
    );
    response
}

/// A rejected check, rendered as HTTP 429.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRejection {
    /// Maximum requests in the window
    pub limit: u32,
    /// Epoch millis when the window has room again
    pub reset_at: u64,
    /// Seconds until the client should retry
    pub retry_after_secs: u64,
    /// Human-readable message
    pub message: String,
}

impl RateLimitRejection {
    pub fn from_result(result: &RateLimitResult, limit: u32, now: u64) -> Self {
        let retry_after_secs = result.retry_after_secs(now);
        Self {
            limit,
            reset_at: result.reset_at,
            retry_after_secs,
            message: result.error.clone().unwrap_or_else(|| {
                format!("Rate limit exceeded. Try again in {} seconds.", retry_after_secs)
            }),
        }
    }
}

impl IntoResponse for RateLimitRejection {
    fn into_response(self) -> Response {
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": self.message,
                "retryAfter": self.retry_after_secs,
            })),
        )
            .into_response();

        let headers = response.headers_mut();
        add_rate_limit_headers(headers, self.limit, 0, self.reset_at);
        headers.insert(RETRY_AFTER, HeaderValue::from(self.retry_after_secs));
        response
    }
}

/// Add rate limit headers to a response.
fn add_rate_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_at_ms: u64) {
    headers.insert(headers::X_RATELIMIT_LIMIT.clone(), HeaderValue::from(limit));
    headers.insert(headers::X_RATELIMIT_REMAINING.clone(), HeaderValue::from(remaining));
    headers.insert(
        headers::X_RATELIMIT_RESET.clone(),
        HeaderValue::from(reset_at_ms.div_ceil(1000)),
    );
}
