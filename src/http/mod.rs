//! HTTP adapter for the rate limiter.

mod auth;
mod client;
mod handlers;
mod middleware;
mod server;

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use auth::{keys_match, require_api_key, ApiKeyGuard, AuthRejection};
pub use client::{client_identity, user_agent_fingerprint, ClientIdentity};
pub use handlers::{ApiError, AppState, CheckRequest, StatusQuery};
pub use middleware::{rate_limit_middleware, RateLimitLayerState, RateLimitRejection};
pub use server::HttpServer;

/// Endpoint tag charged by the `/v1` rate limit layer.
pub const API_ENDPOINT_TAG: &str = "api";

/// Build the service router.
///
/// `/v1` routes check the API key first, then charge one request against
/// the caller's `api` quota using `api_preset`.
pub fn router(state: AppState, guard: ApiKeyGuard, api_preset: &str) -> Router {
    let rate_limit =
        RateLimitLayerState::new(Arc::clone(&state.limiter), API_ENDPOINT_TAG, api_preset);

    let api = Router::new()
        .route("/presets", get(handlers::list_presets))
        .route("/check", post(handlers::check))
        .route("/status", get(handlers::status))
        .route("/limits/:endpoint/:client", delete(handlers::reset))
        .route_layer(from_fn_with_state(rate_limit, rate_limit_middleware))
        .route_layer(from_fn_with_state(Arc::new(guard), require_api_key))
        .with_state(state);

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/v1", api)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use secrecy::SecretString;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::ratelimit::RateLimiter;

    const KEY: &str = "test-key";

    fn test_app() -> (Router, Arc<RateLimiter>) {
        let limiter = Arc::new(RateLimiter::new());
        let guard =
            ApiKeyGuard::new(Some(SecretString::new(KEY.to_string())), "x-api-key").unwrap();
        let app = router(AppState::new(Arc::clone(&limiter)), guard, "chat");
        (app, limiter)
    }

    fn check_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/check")
            .header("x-api-key", KEY)
            .header("x-forwarded-for", "203.0.113.5")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_key() {
        let (app, limiter) = test_app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
        assert_eq!(limiter.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_key_is_401_and_consumes_nothing() {
        let (app, limiter) = test_app();
        let response = app
            .oneshot(Request::builder().uri("/v1/presets").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(limiter.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_presets_listed() {
        let (app, _) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/presets")
                    .header("x-api-key", KEY)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-ratelimit-remaining"));
        let body = json_body(response).await;
        assert_eq!(body["report"]["maxRequests"], 3);
        assert_eq!(body["market-intel"]["windowMs"], 3_600_000);
    }

    #[tokio::test]
    async fn test_check_until_rejected() {
        let (app, limiter) = test_app();

        for expected_remaining in [2, 1, 0] {
            let response = app
                .clone()
                .oneshot(check_request(r#"{"endpoint":"report-gen","preset":"report"}"#))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = json_body(response).await;
            assert_eq!(body["allowed"], true);
            assert_eq!(body["remaining"], expected_remaining);
        }

        let response = app
            .oneshot(check_request(r#"{"endpoint":"report-gen","preset":"report"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));

        let body = json_body(response).await;
        let retry_after = body["retryAfter"].as_u64().unwrap();
        let message = body["error"].as_str().unwrap();
        assert!(message.contains(&format!("Try again in {} seconds", retry_after)));

        let entry = limiter
            .get_rate_limit_status("report-gen", "203.0.113.5")
            .unwrap();
        assert_eq!(entry.count(), 3);
    }

    #[tokio::test]
    async fn test_check_with_explicit_client() {
        let (app, limiter) = test_app();
        let response = app
            .oneshot(check_request(r#"{"endpoint":"chat","preset":"chat","client":"user-7"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(limiter.get_rate_limit_status("chat", "user-7").is_some());
        assert!(limiter.get_rate_limit_status("chat", "203.0.113.5").is_none());
    }

    #[tokio::test]
    async fn test_check_empty_endpoint_is_400() {
        let (app, _) = test_app();
        let response = app.oneshot(check_request(r#"{"endpoint":""}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_and_reset() {
        let (app, limiter) = test_app();
        limiter.check_now("user-9", "bulk", "bulk");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/v1/status?endpoint=bulk&client=user-9")
                    .header("x-api-key", KEY)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["requests"].as_array().unwrap().len(), 1);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/v1/limits/bulk/user-9")
                    .header("x-api-key", KEY)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(limiter.get_rate_limit_status("bulk", "user-9").is_none());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/status?endpoint=bulk&client=user-9")
                    .header("x-api-key", KEY)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_api_layer_uses_configured_preset() {
        let (app, limiter) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/presets")
                    .header("x-api-key", KEY)
                    .header("x-real-ip", "198.51.100.1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // chat preset allows 20 per window
        assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "20");
        assert!(limiter
            .get_rate_limit_status(API_ENDPOINT_TAG, "198.51.100.1")
            .is_some());
    }
}
