use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::ApiError;
use crate::services::AppState;

/// Fixed-window limit applied per client IP to one route.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitRule {
    pub scope: &'static str,
    pub limit: u32,
    pub window_seconds: u64,
    /// Environment variable that overrides `limit`.
    pub limit_env: &'static str,
}

// 10 attempts per 5 minutes
pub const LOGIN_RULE: RateLimitRule = RateLimitRule {
    scope: "login",
    limit: 10,
    window_seconds: 300,
    limit_env: "RATE_LIMIT_LOGIN_ATTEMPTS",
};

// 5 registrations per hour
pub const REGISTER_RULE: RateLimitRule = RateLimitRule {
    scope: "register",
    limit: 5,
    window_seconds: 3600,
    limit_env: "RATE_LIMIT_REGISTER_ATTEMPTS",
};

impl RateLimitRule {
    fn effective_limit(&self) -> u32 {
        std::env::var(self.limit_env)
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(self.limit)
    }

    fn key(&self, client_ip: &str) -> String {
        format!("ratelimit:{}:{}", self.scope, client_ip)
    }
}

fn extract_client_ip_from(headers: &HeaderMap, extensions: &axum::http::Extensions) -> String {
    // Preferred order: X-Forwarded-For, Forwarded, X-Real-IP, ConnectInfo
    if let Some(v) = headers.get("x-forwarded-for") {
        if let Ok(s) = v.to_str() {
            // x-forwarded-for can be a comma separated list; take first
            return s.split(',').next().unwrap_or(s).trim().to_string();
        }
    }

    if let Some(v) = headers.get("forwarded") {
        if let Ok(s) = v.to_str() {
            for part in s.split(';') {
                if let Some(val) = part.trim().strip_prefix("for=") {
                    return val.trim().trim_matches('"').to_string();
                }
            }
        }
    }

    if let Some(v) = headers.get("x-real-ip") {
        if let Ok(s) = v.to_str() {
            return s.trim().to_string();
        }
    }

    if let Some(ci) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return ci.0.ip().to_string();
    }

    "unknown".to_string()
}

fn rate_limiting_disabled() -> bool {
    std::env::var("RATE_LIMIT_DISABLED").unwrap_or_default() == "1"
}

async fn enforce(
    state: &AppState,
    rule: RateLimitRule,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if rate_limiting_disabled() {
        tracing::debug!("Rate limiting disabled via RATE_LIMIT_DISABLED=1");
        return Ok(next.run(request).await);
    }

    let client_ip = extract_client_ip_from(request.headers(), request.extensions());

    let allowed = check_rate_limit_with_window(
        &state.redis,
        &rule.key(&client_ip),
        rule.effective_limit(),
        rule.window_seconds,
    )
    .await
    .map_err(|e| {
        tracing::error!("{} rate limit check failed: {}", rule.scope, e);
        ApiError::Internal(e)
    })?;

    if !allowed {
        tracing::warn!("{} rate limit exceeded for IP: {}", rule.scope, client_ip);
        return Err(ApiError::TooManyRequests(
            "Too many requests. Please try again later.".to_string(),
        ));
    }

    Ok(next.run(request).await)
}

pub async fn login_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    enforce(&state, LOGIN_RULE, request, next).await
}

pub async fn register_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    enforce(&state, REGISTER_RULE, request, next).await
}

/// Atomic fixed-window counter; the window starts at the first hit.
async fn check_rate_limit_with_window(
    redis: &ConnectionManager,
    key: &str,
    limit: u32,
    window_seconds: u64,
) -> anyhow::Result<bool> {
    let mut conn = redis.clone();

    let lua_script = r#"
        local key = KEYS[1]
        local limit = tonumber(ARGV[1])
        local window = tonumber(ARGV[2])

        local current = redis.call('GET', key)

        if current == false then
            redis.call('SET', key, 1, 'EX', window)
            return 1
        end

        current = tonumber(current)

        if current >= limit then
            return 0
        end

        redis.call('INCR', key)
        return 1
    "#;

    let allowed: u32 = redis::Script::new(lua_script)
        .key(key)
        .arg(limit)
        .arg(window_seconds)
        .invoke_async(&mut conn)
        .await?;

    Ok(allowed == 1)
}
