//! HTTP middleware for the gateway API.
//!
//! Provides admin API key authentication, security response headers, and
//! request logging. The shield endpoints are public by configuration; all
//! other routes require the admin key.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{LoggingConfig, SecurityConfig};

/// Shared state for the middleware stack.
#[derive(Clone)]
pub struct MiddlewareState {
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

/// Extract the client IP, preferring reverse-proxy headers over the socket.
pub fn client_ip(headers: &HeaderMap, addr: Option<&SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(ip) = value.split(',').next() {
                return ip.trim().to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip) = real_ip.to_str() {
            return ip.trim().to_string();
        }
    }

    addr.map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn is_public_path(path: &str, public_paths: &[String]) -> bool {
    public_paths.iter().any(|p| path.starts_with(p))
}

/// Admin API key authentication. Public paths and disabled auth pass through.
pub async fn auth_middleware(
    State(state): State<MiddlewareState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let path = request.uri().path();

    if is_public_path(path, &state.security.public_paths) {
        return Ok(next.run(request).await);
    }
    if !state.security.enable_admin_auth {
        return Ok(next.run(request).await);
    }

    let api_key = headers
        .get("x-api-key")
        .or_else(|| headers.get("authorization"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim_start_matches("Bearer ").to_string());

    match api_key {
        Some(key) if key == state.security.admin_api_key => {
            debug!("admin key accepted for path: {}", path);
            Ok(next.run(request).await)
        }
        Some(_) => {
            warn!("invalid admin key for path: {}", path);
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            warn!("missing admin key for path: {}", path);
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Standard security response headers.
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
    headers.insert(
        "Cache-Control",
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.remove("Server");

    response
}

/// Per-request logging with latency.
pub async fn logging_middleware(
    State(state): State<MiddlewareState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if !state.logging.log_requests {
        return next.run(request).await;
    }

    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let ip = client_ip(&headers, Some(&addr));

    let response = next.run(request).await;

    info!(
        %method,
        path,
        ip = %ip,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request"
    );
    response
}
