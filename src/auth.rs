//! HTTP Basic Authentication for the internal collaborator API

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Username for internal routes (None = auth disabled)
    pub username: Option<String>,
    /// Password for internal routes
    pub password: Option<String>,
}

impl AuthConfig {
    /// Load auth config from environment variables
    /// INTERNAL_USERNAME and INTERNAL_PASSWORD must both be set to enable auth
    pub fn from_env() -> Self {
        let username = std::env::var("INTERNAL_USERNAME")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let password = std::env::var("INTERNAL_PASSWORD")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if username.is_some() && password.is_some() {
            tracing::info!("Internal API authentication enabled");
            Self { username, password }
        } else {
            if username.is_some() || password.is_some() {
                tracing::warn!(
                    "INTERNAL_USERNAME and INTERNAL_PASSWORD must both be set to enable authentication"
                );
            }
            tracing::warn!("Internal API authentication DISABLED - anyone can merge identities and rank sessions!");
            Self::disabled()
        }
    }

    pub fn disabled() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Validate credentials
    pub fn validate(&self, username: &str, password: &str) -> bool {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => {
                constant_time_eq(u.as_bytes(), username.as_bytes())
                    && constant_time_eq(p.as_bytes(), password.as_bytes())
            }
            _ => true, // Auth disabled, allow all
        }
    }

    /// Check an `Authorization` header value
    fn accepts(&self, authorization: &str) -> bool {
        authorization
            .strip_prefix("Basic ")
            .and_then(|encoded| STANDARD.decode(encoded.trim()).ok())
            .and_then(|decoded| String::from_utf8(decoded).ok())
            .and_then(|credentials| {
                credentials
                    .split_once(':')
                    .map(|(username, password)| self.validate(username, password))
            })
            .unwrap_or(false)
    }
}

/// Constant-time byte comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Middleware for HTTP Basic Authentication on `/internal` routes
pub async fn internal_auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !auth_config.is_enabled() {
        return next.run(request).await;
    }

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| auth_config.accepts(value));

    if authorized {
        return next.run(request).await;
    }

    tracing::warn!(path = %request.uri().path(), "Rejected internal request without valid credentials");
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"iconquiz internal\"")],
        "Unauthorized",
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled() -> AuthConfig {
        AuthConfig {
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
        }
    }

    #[test]
    fn test_auth_config_disabled_when_incomplete() {
        let config = AuthConfig::disabled();
        assert!(!config.is_enabled());
        assert!(config.validate("any", "thing")); // Passes when disabled

        let config = AuthConfig {
            username: Some("user".to_string()),
            password: None,
        };
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_auth_config_enabled() {
        let config = enabled();
        assert!(config.is_enabled());
        assert!(config.validate("admin", "secret"));
        assert!(!config.validate("admin", "wrong"));
        assert!(!config.validate("wrong", "secret"));
        assert!(!config.validate("", ""));
    }

    #[test]
    fn test_authorization_header_parsing() {
        let config = enabled();
        // "admin:secret"
        assert!(config.accepts("Basic YWRtaW46c2VjcmV0"));
        // "user:pass"
        assert!(!config.accepts("Basic dXNlcjpwYXNz"));
        assert!(!config.accepts("Bearer YWRtaW46c2VjcmV0"));
        assert!(!config.accepts("Basic !!!"));
        // "adminsecret" has no separator
        assert!(!config.accepts("Basic YWRtaW5zZWNyZXQ="));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
        assert!(!constant_time_eq(b"", b"x"));
        assert!(constant_time_eq(b"", b""));
    }
}
