//! Security Middleware for the league API
//!
//! Provides:
//! - Admin API key check for operator endpoints
//! - Request size limits
//! - Security headers
//! - Request logging

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Security configuration for middleware
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Key for admin endpoints; `None` rejects every admin request
    pub admin_api_key: Option<String>,
    /// Maximum request body size in bytes
    pub max_request_size: usize,
    /// Enable request logging
    pub log_requests: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            admin_api_key: None,
            max_request_size: 64 * 1024,
            log_requests: false,
        }
    }
}

/// Shared state for security middleware
#[derive(Clone, Default)]
pub struct SecurityState {
    pub config: SecurityConfig,
}

impl SecurityState {
    pub fn new(config: SecurityConfig) -> Self {
        Self { config }
    }
}

/// Mask a secret for logging
pub fn sanitize_for_log(value: &str) -> String {
    if value.len() <= 8 {
        return "*".repeat(value.len());
    }
    format!("{}...{}", &value[..4], &value[value.len() - 4..])
}

fn presented_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-api-key")
        .or_else(|| headers.get("authorization"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim_start_matches("Bearer ").to_string())
}

/// Admin authentication middleware
pub async fn admin_auth_middleware(
    State(state): State<SecurityState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let path = request.uri().path().to_string();

    let Some(expected) = state.config.admin_api_key.as_deref() else {
        warn!("Admin request to {} rejected: no admin API key configured", path);
        return Err(StatusCode::FORBIDDEN);
    };

    match presented_key(&headers) {
        Some(key) if key == expected => {
            debug!("Admin API key authenticated for path: {}", path);
            Ok(next.run(request).await)
        }
        Some(key) => {
            warn!(
                "Invalid admin API key {} for path: {}",
                sanitize_for_log(&key),
                path
            );
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            warn!("Missing admin API key for path: {}", path);
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Security headers middleware
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    // Leaderboards are live; never serve them from a cache
    headers.insert(
        "Cache-Control",
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.remove("Server");

    response
}

/// Request logging middleware
pub async fn logging_middleware(
    State(state): State<SecurityState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.log_requests {
        return next.run(request).await;
    }

    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        error!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request failed"
        );
    } else if status.is_client_error() {
        warn!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Client error"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    }

    response
}

/// Request body size validation middleware
pub async fn body_size_middleware(
    State(state): State<SecurityState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(length) = headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<usize>().ok())
    {
        if length > state.config.max_request_size {
            warn!(
                "Request body too large: {} bytes (max: {})",
                length, state.config.max_request_size
            );
            return Err(StatusCode::PAYLOAD_TOO_LARGE);
        }
    }

    Ok(next.run(request).await)
}
