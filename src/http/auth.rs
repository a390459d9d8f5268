//! Static API key guard.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderName, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::config::AuthConfig;
use crate::error::{GuardError, Result};

/// Checks a shared secret carried in a request header.
///
/// The key is read from the configured header, or from an
/// `Authorization: Bearer` header when that one is absent.
#[derive(Debug, Clone)]
pub struct ApiKeyGuard {
    api_key: Option<SecretString>,
    header: HeaderName,
}

/// Why a request failed the key check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    MissingKey,
    InvalidKey,
}

impl ApiKeyGuard {
    /// Create a guard expecting `api_key` in `header`.
    ///
    /// A `None` key disables the guard.
    pub fn new(api_key: Option<SecretString>, header: &str) -> Result<Self> {
        let header = HeaderName::from_bytes(header.as_bytes())
            .map_err(|e| GuardError::Config(format!("invalid auth header {:?}: {}", header, e)))?;
        Ok(Self { api_key, header })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        Self::new(config.api_key.clone(), &config.header)
    }

    /// A guard that admits every request.
    pub fn disabled() -> Self {
        Self {
            api_key: None,
            header: HeaderName::from_static("x-api-key"),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Verify the key carried by `headers`.
    pub fn verify(&self, headers: &HeaderMap) -> std::result::Result<(), AuthRejection> {
        let Some(expected) = &self.api_key else {
            return Ok(());
        };

        let provided = headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .or_else(|| {
                headers
                    .get(AUTHORIZATION)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.strip_prefix("Bearer "))
            })
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(AuthRejection::MissingKey)?;

        if keys_match(expected.expose_secret().as_bytes(), provided.as_bytes()) {
            Ok(())
        } else {
            Err(AuthRejection::InvalidKey)
        }
    }
}

/// Compare two keys in constant time.
///
/// The length check leaks only the key length, which is not secret.
pub fn keys_match(expected: &[u8], provided: &[u8]) -> bool {
    if expected.len() != provided.len() {
        return false;
    }
    expected.ct_eq(provided).into()
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let message = match self {
            AuthRejection::MissingKey => "API key required",
            AuthRejection::InvalidKey => "Invalid API key",
        };
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": message })),
        )
            .into_response()
    }
}

/// Middleware rejecting requests without a valid API key.
pub async fn require_api_key(
    State(guard): State<Arc<ApiKeyGuard>>,
    request: Request,
    next: Next,
) -> Response {
    if let Err(rejection) = guard.verify(request.headers()) {
        warn!(
            path = %request.uri().path(),
            reason = ?rejection,
            "Rejected request with bad API key"
        );
        return rejection.into_response();
    }
    next.run(request).await
}
