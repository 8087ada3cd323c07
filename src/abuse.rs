//! Anti-abuse middleware for the public game API
//!
//! Cheap filters in front of `/api`:
//! - Blocks curl/wget user agents (basic bot filtering)
//! - Requires X-Iconquiz-Client header (the game client sets this, curl doesn't)
//! - Rate limiting per owner or client address (prevents answer flooding)

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

/// Required header that game clients must send
pub const REQUIRED_HEADER: &str = "X-Iconquiz-Client";
pub const REQUIRED_HEADER_VALUE: &str = "1";

/// Rate limiter state
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Map of owner/address to (request count, window start)
    requests: Arc<RwLock<HashMap<String, (u32, Instant)>>>,
    /// Maximum requests per window
    max_requests: u32,
    /// Time window duration
    window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(10)) // 100 requests per 10 seconds
    }
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check if a request should be allowed
    /// Returns true if allowed, false if rate limited
    pub async fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        match requests.get_mut(key) {
            Some((count, window_start)) => {
                if now.duration_since(*window_start) >= self.window {
                    *count = 1;
                    *window_start = now;
                    true
                } else if *count >= self.max_requests {
                    false
                } else {
                    *count += 1;
                    true
                }
            }
            None => {
                requests.insert(key.to_string(), (1, now));
                true
            }
        }
    }

    /// Drop entries whose window ended long ago
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        requests.retain(|_, (_, window_start)| now.duration_since(*window_start) < self.window * 2);
    }

    pub async fn tracked_keys(&self) -> usize {
        self.requests.read().await.len()
    }
}

/// Anti-abuse configuration
#[derive(Debug, Clone)]
pub struct AbuseConfig {
    /// Whether to block suspicious user agents
    pub block_user_agents: bool,
    /// Whether to require the game client header
    pub require_client_header: bool,
    /// Rate limiter (None = disabled)
    pub rate_limiter: Option<RateLimiter>,
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            block_user_agents: true,
            require_client_header: true,
            rate_limiter: Some(RateLimiter::default()),
        }
    }
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v != "0" && v.to_lowercase() != "false")
        .unwrap_or(true)
}

impl AbuseConfig {
    /// Every check switched off
    pub fn disabled() -> Self {
        Self {
            block_user_agents: false,
            require_client_header: false,
            rate_limiter: None,
        }
    }

    /// Load config from environment variables
    pub fn from_env() -> Self {
        let block_user_agents = env_flag("ABUSE_BLOCK_USER_AGENTS");
        let require_client_header = env_flag("ABUSE_REQUIRE_CLIENT_HEADER");
        let rate_limit_enabled = env_flag("ABUSE_RATE_LIMIT");

        let rate_limiter = if rate_limit_enabled {
            let max_requests = std::env::var("ABUSE_RATE_LIMIT_MAX")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100);

            let window_secs = std::env::var("ABUSE_RATE_LIMIT_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10);

            Some(RateLimiter::new(
                max_requests,
                Duration::from_secs(window_secs),
            ))
        } else {
            None
        };

        tracing::info!(
            block_user_agents,
            require_client_header,
            rate_limit_enabled,
            "Anti-abuse config loaded"
        );

        Self {
            block_user_agents,
            require_client_header,
            rate_limiter,
        }
    }
}

/// Check if a user agent looks like a bot/curl
fn is_blocked_user_agent(user_agent: &str) -> bool {
    let ua_lower = user_agent.to_lowercase();
    if ua_lower.contains("curl")
        || ua_lower.contains("wget")
        || ua_lower.contains("httpie")
        || ua_lower.contains("python-requests")
        || ua_lower.contains("python-urllib")
        || ua_lower.contains("libwww-perl")
        || ua_lower.contains("go-http-client")
        || ua_lower.contains("java/")
    {
        return true;
    }

    // "bot" as a word, not a substring
    ua_lower.ends_with("bot")
        || ua_lower.contains("bot/")
        || ua_lower.contains("bot ")
        || ua_lower.contains("spider")
        || ua_lower.contains("crawler")
}

fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, v)| *k == key && !v.is_empty())
        .map(|(_, v)| v)
}

fn client_address(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Owner id from the query string, else the proxied client address.
/// Requests carrying neither are not rate limited.
fn get_rate_limit_key(request: &Request<Body>) -> Option<String> {
    if let Some(owner) = request
        .uri()
        .query()
        .and_then(|q| query_param(q, "owner_id"))
    {
        return Some(format!("owner:{}", owner));
    }
    client_address(request.headers()).map(|ip| format!("ip:{}", ip))
}

fn forbidden(message: &'static str) -> Response {
    (
        StatusCode::FORBIDDEN,
        [(header::CONTENT_TYPE, "text/plain")],
        message,
    )
        .into_response()
}

fn rate_limited(window: Duration) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            (header::CONTENT_TYPE, "text/plain".to_string()),
            (header::RETRY_AFTER, window.as_secs().max(1).to_string()),
        ],
        "Rate limit exceeded. Please slow down.",
    )
        .into_response()
}

/// Middleware for anti-abuse protection on the public API
pub async fn api_abuse_middleware(
    State(config): State<Arc<AbuseConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if config.block_user_agents {
        match request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|ua| ua.to_str().ok())
        {
            Some(ua) if is_blocked_user_agent(ua) => {
                tracing::warn!(user_agent = ua, "Blocked suspicious user agent");
                return forbidden("Access denied");
            }
            Some(_) => {}
            None => {
                tracing::warn!("Blocked request with no User-Agent");
                return forbidden("Access denied");
            }
        }
    }

    if config.require_client_header {
        let has_header = request
            .headers()
            .get(REQUIRED_HEADER)
            .is_some_and(|v| v == REQUIRED_HEADER_VALUE);
        if !has_header {
            tracing::warn!(uri = %request.uri(), "Blocked request without client header");
            return forbidden("Access denied");
        }
    }

    if let Some(ref rate_limiter) = config.rate_limiter {
        if let Some(key) = get_rate_limit_key(&request) {
            if !rate_limiter.check(&key).await {
                tracing::warn!(key, "Rate limited");
                return rate_limited(rate_limiter.window());
            }
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_user_agents() {
        assert!(is_blocked_user_agent("curl/7.64.1"));
        assert!(is_blocked_user_agent("Wget/1.20.3"));
        assert!(is_blocked_user_agent("python-requests/2.25.1"));
        assert!(is_blocked_user_agent("Go-http-client/1.1"));
        assert!(is_blocked_user_agent("HTTPie/2.4.0"));
        assert!(is_blocked_user_agent("Googlebot/2.1"));
        assert!(is_blocked_user_agent("bingbot"));
        assert!(is_blocked_user_agent("WebCrawler/1.0"));

        assert!(!is_blocked_user_agent(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"
        ));
        assert!(!is_blocked_user_agent(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 14_0 like Mac OS X)"
        ));
        assert!(!is_blocked_user_agent(""));
    }

    #[test]
    fn test_rate_limit_key_prefers_owner() {
        let req = Request::builder()
            .uri("/api/leaderboard?page=2&owner_id=user-1")
            .header("x-forwarded-for", "10.0.0.1, 10.0.0.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(get_rate_limit_key(&req).as_deref(), Some("owner:user-1"));

        let req = Request::builder()
            .uri("/api/sessions")
            .header("x-forwarded-for", "10.0.0.1, 10.0.0.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(get_rate_limit_key(&req).as_deref(), Some("ip:10.0.0.1"));

        let req = Request::builder()
            .uri("/api/sessions?owner_id=")
            .header("x-real-ip", "192.168.1.9")
            .body(Body::empty())
            .unwrap();
        assert_eq!(get_rate_limit_key(&req).as_deref(), Some("ip:192.168.1.9"));

        let req = Request::builder()
            .uri("/api/sessions")
            .body(Body::empty())
            .unwrap();
        assert!(get_rate_limit_key(&req).is_none());
    }

    #[tokio::test]
    async fn test_rate_limiter_allows_normal_traffic() {
        let limiter = RateLimiter::new(5, Duration::from_secs(1));

        for _ in 0..5 {
            assert!(limiter.check("test-key").await);
        }
        assert!(!limiter.check("test-key").await);
    }

    #[tokio::test]
    async fn test_rate_limiter_different_keys() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));

        assert!(limiter.check("key1").await);
        assert!(limiter.check("key1").await);
        assert!(!limiter.check("key1").await);

        assert!(limiter.check("key2").await);
        assert!(limiter.check("key2").await);
        assert!(!limiter.check("key2").await);
    }

    #[tokio::test]
    async fn test_rate_limiter_window_reset_and_cleanup() {
        let limiter = RateLimiter::new(2, Duration::from_millis(50));

        assert!(limiter.check("key").await);
        assert!(limiter.check("key").await);
        assert!(!limiter.check("key").await);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(limiter.check("key").await);

        tokio::time::sleep(Duration::from_millis(110)).await;
        limiter.cleanup().await;
        assert_eq!(limiter.tracked_keys().await, 0);
    }

    #[test]
    fn test_abuse_config_default() {
        let config = AbuseConfig::default();
        assert!(config.block_user_agents);
        assert!(config.require_client_header);
        assert!(config.rate_limiter.is_some());

        let config = AbuseConfig::disabled();
        assert!(!config.block_user_agents && !config.require_client_header);
        assert!(config.rate_limiter.is_none());
    }
}
