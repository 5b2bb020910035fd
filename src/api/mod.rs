//! HTTP API for the security gateway.
//!
//! Two routers: `/security` for the admin surface (journal, blocks,
//! whitelist, alerts) and `/shield` for the public challenge flow. The
//! middleware stack applies admin auth, security headers, and request
//! logging across both.

pub mod middleware;
pub mod security;
pub mod shield;

pub use middleware::{
    auth_middleware, client_ip, logging_middleware, security_headers_middleware, MiddlewareState,
};
pub use security::{create_security_router, SecurityApiState};
pub use shield::{create_shield_router, ShieldApiState};

use axum::http::StatusCode;
use tracing::error;

use crate::error::GatewayError;

/// Map a gateway error onto an HTTP status. Validation problems are the
/// caller's fault; a store outage fails closed with 503.
pub(crate) fn error_response(err: GatewayError) -> (StatusCode, String) {
    match err {
        GatewayError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        GatewayError::Store(e) => {
            error!("store error: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "security store unavailable".to_string(),
            )
        }
    }
}
