//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to prevent brute force attacks.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};
use tracing::warn;

use crate::auth::{ClientIpHeader, extract_client_ip};

/// Per-IP rate limiter for stricter endpoint-specific limiting.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Request budgets per client IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub login_per_second: u32,
    pub login_burst: u32,
    pub register_per_minute: u32,
    pub password_reset_per_minute: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            login_per_second: 1,
            login_burst: 5,
            register_per_minute: 3,
            password_reset_per_minute: 3,
        }
    }
}

impl RateLimitSettings {
    /// Budgets high enough that tests never hit them.
    pub fn relaxed() -> Self {
        Self {
            login_per_second: 1000,
            login_burst: 1000,
            register_per_minute: 1000,
            password_reset_per_minute: 1000,
        }
    }
}

fn non_zero(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

/// Rate limiters for authentication endpoints.
pub struct RateLimitConfig {
    /// Login attempts (prevents brute force)
    pub login: IpLimiter,
    /// User creation (prevents spam)
    pub register: IpLimiter,
    /// Password reset requests (prevents mail flooding)
    pub password_reset: IpLimiter,
    /// Where the client address comes from
    pub ip_header: Option<ClientIpHeader>,
}

impl RateLimitConfig {
    pub fn new(settings: RateLimitSettings, ip_header: Option<ClientIpHeader>) -> Self {
        Self {
            login: RateLimiter::keyed(
                Quota::per_second(non_zero(settings.login_per_second))
                    .allow_burst(non_zero(settings.login_burst)),
            ),
            register: RateLimiter::keyed(Quota::per_minute(non_zero(
                settings.register_per_minute,
            ))),
            password_reset: RateLimiter::keyed(Quota::per_minute(non_zero(
                settings.password_reset_per_minute,
            ))),
            ip_header,
        }
    }
}

async fn check(
    config: &RateLimitConfig,
    limiter: &IpLimiter,
    message: &'static str,
    request: Request,
    next: Next,
) -> Response {
    let ip = match extract_client_ip(&request, config.ip_header) {
        Ok(ip) => ip,
        Err(e) => {
            warn!(reason = e, "Rejecting request without client IP");
            return (StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response();
        }
    };

    match limiter.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
            (StatusCode::TOO_MANY_REQUESTS, message).into_response()
        }
    }
}

/// Middleware for rate limiting login attempts.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        &config,
        &config.login,
        "Too many authentication attempts. Please wait before trying again.",
        request,
        next,
    )
    .await
}

/// Middleware for rate limiting user creation.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        &config,
        &config.register,
        "Too many signup attempts. Please wait before trying again.",
        request,
        next,
    )
    .await
}

/// Middleware for rate limiting password reset requests.
pub async fn rate_limit_password_reset(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        &config,
        &config.password_reset,
        "Too many password reset requests. Please wait before trying again.",
        request,
        next,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_burst_then_block() {
        let config = RateLimitConfig::new(RateLimitSettings::default(), None);
        let ip = "203.0.113.1".to_string();
        for _ in 0..5 {
            assert!(config.login.check_key(&ip).is_ok());
        }
        assert!(config.login.check_key(&ip).is_err());
        // Other clients are unaffected
        assert!(config.login.check_key(&"203.0.113.2".to_string()).is_ok());
    }

    #[test]
    fn test_register_per_minute() {
        let config = RateLimitConfig::new(RateLimitSettings::default(), None);
        let ip = "203.0.113.1".to_string();
        for _ in 0..3 {
            assert!(config.register.check_key(&ip).is_ok());
        }
        assert!(config.register.check_key(&ip).is_err());
    }
}
