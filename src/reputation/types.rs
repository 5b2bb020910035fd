//! Reputation data types.
//!
//! Closed choice sets are enums, never free strings: an unknown block kind or
//! failure kind is a construction-time error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of block currently applied to an IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    None,
    Temporary,
    Permanent,
}

/// What failed: drives event metadata, not behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Login,
    Shield,
    Form,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Login => "login",
            FailureKind::Shield => "shield",
            FailureKind::Form => "form",
        }
    }
}

/// Namespace selector for `clear_security_cache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKeyKind {
    Ip,
    Email,
}

impl CacheKeyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKeyKind::Ip => "ip",
            CacheKeyKind::Email => "email",
        }
    }
}

/// Block record as stored in the cache (key `ip_block:{ip}`). Temporary blocks
/// carry their duration in the key's TTL, so remaining time comes from the
/// store, not from this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRecord {
    pub kind: BlockKind,
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
}

/// Read-only status snapshot for one IP.
#[derive(Debug, Clone, Serialize)]
pub struct IpStatus {
    pub ip: String,
    pub is_blocked: bool,
    pub block_kind: BlockKind,
    /// Seconds until a temporary block lapses. `None` for unblocked IPs and
    /// for permanent blocks.
    pub remaining_seconds: Option<u64>,
    pub failed_attempts: i64,
    pub offense_count: i64,
    pub is_whitelisted: bool,
}

/// Whitelist membership record (key `whitelist:{ip}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub ip: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Entry in the admin blocklist listing.
#[derive(Debug, Clone, Serialize)]
pub struct BlockedIp {
    pub ip: String,
    pub kind: BlockKind,
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
    pub remaining_seconds: Option<u64>,
}

/// Result of a block request. Refusal by policy is a value, not an error,
/// so bulk operations report per-item outcomes without aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Block applied. `seconds_blocked` is `None` for permanent blocks.
    Applied { seconds_blocked: Option<u64> },
    /// Refused: the IP is whitelisted. No state changed.
    Denied,
}

impl BlockOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, BlockOutcome::Applied { .. })
    }

    pub fn seconds_blocked(&self) -> Option<u64> {
        match self {
            BlockOutcome::Applied { seconds_blocked } => *seconds_blocked,
            BlockOutcome::Denied => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&BlockKind::Temporary).unwrap(),
            "\"temporary\""
        );
        assert!(serde_json::from_str::<BlockKind>("\"forever\"").is_err());
    }

    #[test]
    fn test_block_outcome_accessors() {
        let temp = BlockOutcome::Applied {
            seconds_blocked: Some(900),
        };
        assert!(temp.is_applied());
        assert_eq!(temp.seconds_blocked(), Some(900));
        assert!(!BlockOutcome::Denied.is_applied());
    }
}
