//! Error taxonomy for the gateway.
//!
//! Only two conditions are errors in the `Result` sense: malformed input
//! (rejected before any state is touched) and store I/O failure (propagated,
//! never swallowed). Policy refusals and failed verifications are outcome
//! values so bulk operations can report per-item results without aborting.

use thiserror::Error;

use crate::store::StoreError;

/// Unified error type for gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed input: bad IP, missing nonce/solution, bad date range.
    #[error("validation error: {0}")]
    Validation(String),

    /// Underlying cache/durable-store I/O failure. Fail-closed: callers
    /// surface this rather than assuming the IP is trusted.
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
}

impl GatewayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        GatewayError::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Parse and canonicalize an IP address, rejecting malformed input.
pub fn parse_ip(ip: &str) -> Result<String> {
    ip.trim()
        .parse::<std::net::IpAddr>()
        .map(|addr| addr.to_string())
        .map_err(|_| GatewayError::Validation(format!("invalid IP address: {ip}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ip_valid() {
        assert_eq!(parse_ip("203.0.113.5").unwrap(), "203.0.113.5");
        assert_eq!(parse_ip(" 10.0.0.1 ").unwrap(), "10.0.0.1");
        assert_eq!(parse_ip("::1").unwrap(), "::1");
    }

    #[test]
    fn test_parse_ip_malformed() {
        assert!(parse_ip("not-an-ip").is_err());
        assert!(parse_ip("999.1.1.1").is_err());
        assert!(parse_ip("").is_err());
    }

    #[test]
    fn test_parse_ip_canonical_form() {
        // IPv6 addresses canonicalize to their compressed form
        assert_eq!(parse_ip("0:0:0:0:0:0:0:1").unwrap(), "::1");
    }
}
