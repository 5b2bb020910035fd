//! Security event types.
//!
//! Events are immutable once appended: created with a fresh id and timestamp,
//! never mutated, removed only by bulk retention pruning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Closed set of security event types. Unknown values are a construction-time
/// error, never a free string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    FailedAttempt,
    IpBlockedTemporary,
    IpBlockedPermanent,
    IpUnblocked,
    WhitelistAdded,
    WhitelistRemoved,
    SecurityCacheCleared,
    ShieldVerified,
    ShieldFailed,
    ShieldHoneypot,
}

impl EventType {
    /// All variants, for stats aggregation.
    pub const ALL: [EventType; 10] = [
        EventType::FailedAttempt,
        EventType::IpBlockedTemporary,
        EventType::IpBlockedPermanent,
        EventType::IpUnblocked,
        EventType::WhitelistAdded,
        EventType::WhitelistRemoved,
        EventType::SecurityCacheCleared,
        EventType::ShieldVerified,
        EventType::ShieldFailed,
        EventType::ShieldHoneypot,
    ];

    /// The subset the shield journal view is restricted to.
    pub const SHIELD: [EventType; 3] = [
        EventType::ShieldVerified,
        EventType::ShieldFailed,
        EventType::ShieldHoneypot,
    ];

    /// Wire name (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::FailedAttempt => "failed_attempt",
            EventType::IpBlockedTemporary => "ip_blocked_temporary",
            EventType::IpBlockedPermanent => "ip_blocked_permanent",
            EventType::IpUnblocked => "ip_unblocked",
            EventType::WhitelistAdded => "whitelist_added",
            EventType::WhitelistRemoved => "whitelist_removed",
            EventType::SecurityCacheCleared => "security_cache_cleared",
            EventType::ShieldVerified => "shield_verified",
            EventType::ShieldFailed => "shield_failed",
            EventType::ShieldHoneypot => "shield_honeypot",
        }
    }

    pub fn parse(s: &str) -> Option<EventType> {
        EventType::ALL.iter().copied().find(|t| t.as_str() == s)
    }

    pub fn is_shield(&self) -> bool {
        EventType::SHIELD.contains(self)
    }
}

/// Immutable audit record of a security-relevant occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: String,
    pub event_type: EventType,
    pub ip: String,
    pub user_id: Option<String>,
    pub metadata: HashMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(event_type: EventType, ip: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            ip: ip.into(),
            user_id: None,
            metadata: HashMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Query filter. All fields are conjunctive; date bounds are inclusive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    pub event_type: Option<EventType>,
    pub ip: Option<String>,
    pub user_id: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn matches(&self, event: &SecurityEvent) -> bool {
        if let Some(t) = self.event_type {
            if event.event_type != t {
                return false;
            }
        }
        if let Some(ref ip) = self.ip {
            if &event.ip != ip {
                return false;
            }
        }
        if let Some(ref user_id) = self.user_id {
            if event.user_id.as_deref() != Some(user_id.as_str()) {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if event.occurred_at < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if event.occurred_at > to {
                return false;
            }
        }
        true
    }
}

/// One page of a newest-first query result.
#[derive(Debug, Clone, Serialize)]
pub struct EventPage {
    pub events: Vec<SecurityEvent>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
}

/// Retention argument for pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retain {
    Days(u32),
    All,
}
