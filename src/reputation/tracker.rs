//! IP reputation tracker.
//!
//! Orchestrates failure counting, escalating time-boxed blocks, the
//! whitelist override, and journal emission. All state lives in the injected
//! cache store; every transition is a single atomic primitive against one
//! key, and temporary blocks expire through the store's own TTL rather than
//! an application timer.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::types::{
    BlockKind, BlockOutcome, BlockRecord, BlockedIp, CacheKeyKind, FailureKind, IpStatus,
    WhitelistEntry,
};
use crate::config::ReputationConfig;
use crate::error::{parse_ip, Result};
use crate::journal::{EventJournal, EventType, SecurityEvent};
use crate::store::CacheStore;

fn block_key(ip: &str) -> String {
    format!("ip_block:{ip}")
}

fn offense_key(ip: &str) -> String {
    format!("ip_offense:{ip}")
}

fn whitelist_key(ip: &str) -> String {
    format!("whitelist:{ip}")
}

fn failure_key(kind: CacheKeyKind, key: &str) -> String {
    format!("failed:{}:{key}", kind.as_str())
}

fn encode<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

pub struct ReputationTracker {
    store: Arc<dyn CacheStore>,
    journal: Arc<EventJournal>,
    config: ReputationConfig,
}

impl ReputationTracker {
    pub fn new(
        store: Arc<dyn CacheStore>,
        journal: Arc<EventJournal>,
        config: ReputationConfig,
    ) -> Self {
        Self {
            store,
            journal,
            config,
        }
    }

    /// Pure read of an IP's standing. Whitelist membership always forces
    /// `is_blocked = false`.
    pub async fn check_status(&self, ip: &str) -> Result<IpStatus> {
        let ip = parse_ip(ip)?;
        let is_whitelisted = self.is_whitelisted(&ip).await?;
        let failed_attempts = self.counter(&failure_key(CacheKeyKind::Ip, &ip)).await?;
        let offense_count = self.counter(&offense_key(&ip)).await?;

        let record = if is_whitelisted {
            None
        } else {
            self.block_record(&ip).await?
        };

        let (is_blocked, block_kind, remaining_seconds) = match record {
            Some(record) => {
                let remaining = match record.kind {
                    BlockKind::Temporary => self
                        .store
                        .ttl(&block_key(&ip))
                        .await?
                        .flatten()
                        .map(|d| d.as_secs()),
                    _ => None,
                };
                (true, record.kind, remaining)
            }
            None => (false, BlockKind::None, None),
        };

        Ok(IpStatus {
            ip,
            is_blocked,
            block_kind,
            remaining_seconds,
            failed_attempts,
            offense_count,
            is_whitelisted,
        })
    }

    /// Record one failed attempt for an IP. Crossing the configured
    /// threshold inside the sliding window auto-invokes a temporary block.
    /// Returns the post-increment count.
    pub async fn record_failure(&self, ip: &str, kind: FailureKind) -> Result<i64> {
        let ip = parse_ip(ip)?;
        let count = self
            .store
            .incr(
                &failure_key(CacheKeyKind::Ip, &ip),
                Some(Duration::from_secs(self.config.failure_window_secs)),
            )
            .await?;

        self.journal
            .append(
                SecurityEvent::new(EventType::FailedAttempt, &ip)
                    .with_metadata("kind", kind.as_str())
                    .with_metadata("count", &count.to_string()),
            )
            .await?;

        // Any at-or-above-threshold failure blocks an IP that is not
        // currently blocked, so an unblock while the window is still hot
        // does not grant a free pass for the rest of the window.
        if count >= self.config.failure_threshold && self.block_record(&ip).await?.is_none() {
            let outcome = self
                .block_temporarily(&ip, "failed attempt threshold exceeded")
                .await?;
            if outcome == BlockOutcome::Denied {
                debug!(ip = %ip, "failure threshold crossed but IP is whitelisted");
            }
        }

        Ok(count)
    }

    /// Apply a temporary block with escalating duration. Each new block for
    /// the same IP lasts at least as long as the previous one because the
    /// offense count only grows and the duration doubles per offense up to
    /// the configured cap.
    pub async fn block_temporarily(&self, ip: &str, reason: &str) -> Result<BlockOutcome> {
        let ip = parse_ip(ip)?;
        if self.is_whitelisted(&ip).await? {
            debug!(ip = %ip, "refusing to block whitelisted IP");
            return Ok(BlockOutcome::Denied);
        }

        // A standing permanent block outranks a temporary one.
        if let Some(record) = self.block_record(&ip).await? {
            if record.kind == BlockKind::Permanent {
                return Ok(BlockOutcome::Applied {
                    seconds_blocked: None,
                });
            }
        }

        let offense_count = self.store.incr(&offense_key(&ip), None).await?;
        let seconds = self.block_duration(offense_count);
        let record = BlockRecord {
            kind: BlockKind::Temporary,
            reason: reason.to_string(),
            blocked_at: chrono::Utc::now(),
        };
        self.store
            .set(
                &block_key(&ip),
                &encode(&record),
                Some(Duration::from_secs(seconds)),
            )
            .await?;

        self.journal
            .append(
                SecurityEvent::new(EventType::IpBlockedTemporary, &ip)
                    .with_metadata("reason", reason)
                    .with_metadata("seconds", &seconds.to_string())
                    .with_metadata("offense_count", &offense_count.to_string()),
            )
            .await?;

        Ok(BlockOutcome::Applied {
            seconds_blocked: Some(seconds),
        })
    }

    /// Apply a permanent block. Stands until an explicit unblock.
    pub async fn block_permanently(&self, ip: &str, reason: &str) -> Result<BlockOutcome> {
        let ip = parse_ip(ip)?;
        if self.is_whitelisted(&ip).await? {
            debug!(ip = %ip, "refusing to block whitelisted IP");
            return Ok(BlockOutcome::Denied);
        }

        let offense_count = self.store.incr(&offense_key(&ip), None).await?;
        let record = BlockRecord {
            kind: BlockKind::Permanent,
            reason: reason.to_string(),
            blocked_at: chrono::Utc::now(),
        };
        self.store.set(&block_key(&ip), &encode(&record), None).await?;

        self.journal
            .append(
                SecurityEvent::new(EventType::IpBlockedPermanent, &ip)
                    .with_metadata("reason", reason)
                    .with_metadata("offense_count", &offense_count.to_string()),
            )
            .await?;

        Ok(BlockOutcome::Applied {
            seconds_blocked: None,
        })
    }

    /// Clear block state. Offense history is deliberately preserved so the
    /// next block escalates from where the IP left off.
    pub async fn unblock(&self, ip: &str) -> Result<()> {
        let ip = parse_ip(ip)?;
        self.store.delete(&block_key(&ip)).await?;
        self.journal
            .append(SecurityEvent::new(EventType::IpUnblocked, &ip))
            .await?;
        Ok(())
    }

    /// Add an IP to the whitelist. Idempotent; implicitly unblocks a
    /// currently blocked IP.
    pub async fn add_to_whitelist(&self, ip: &str, reason: &str) -> Result<WhitelistEntry> {
        let ip = parse_ip(ip)?;
        if let Some(existing) = self.whitelist_entry(&ip).await? {
            return Ok(existing);
        }

        let entry = WhitelistEntry {
            ip: ip.clone(),
            reason: reason.to_string(),
            created_at: chrono::Utc::now(),
        };
        self.store
            .set(&whitelist_key(&ip), &encode(&entry), None)
            .await?;
        self.store.delete(&block_key(&ip)).await?;

        self.journal
            .append(
                SecurityEvent::new(EventType::WhitelistAdded, &ip)
                    .with_metadata("reason", reason),
            )
            .await?;

        info!(ip = %ip, "IP whitelisted");
        Ok(entry)
    }

    /// Remove an IP from the whitelist. Idempotent.
    pub async fn remove_from_whitelist(&self, ip: &str) -> Result<()> {
        let ip = parse_ip(ip)?;
        self.store.delete(&whitelist_key(&ip)).await?;
        self.journal
            .append(SecurityEvent::new(EventType::WhitelistRemoved, &ip))
            .await?;
        Ok(())
    }

    /// Reset failure counters and lift any temporary lock for a key without
    /// touching the permanent offense history.
    pub async fn clear_security_cache(&self, key: &str, kind: CacheKeyKind) -> Result<()> {
        let (canonical, event_ip) = match kind {
            CacheKeyKind::Ip => {
                let ip = parse_ip(key)?;
                (ip.clone(), ip)
            }
            CacheKeyKind::Email => {
                let email = key.trim().to_lowercase();
                if email.is_empty() || !email.contains('@') {
                    return Err(crate::error::GatewayError::validation(format!(
                        "invalid email address: {key}"
                    )));
                }
                (email, "-".to_string())
            }
        };

        self.store.delete(&failure_key(kind, &canonical)).await?;

        if kind == CacheKeyKind::Ip {
            if let Some(record) = self.block_record(&canonical).await? {
                if record.kind == BlockKind::Temporary {
                    self.store.delete(&block_key(&canonical)).await?;
                }
            }
        }

        self.journal
            .append(
                SecurityEvent::new(EventType::SecurityCacheCleared, event_ip)
                    .with_metadata("key_kind", kind.as_str())
                    .with_metadata("key", &canonical),
            )
            .await?;
        Ok(())
    }

    /// Currently blocked IPs, sorted by address.
    pub async fn blocklist(&self) -> Result<Vec<BlockedIp>> {
        let mut blocked = Vec::new();
        for (key, value) in self.store.scan_prefix("ip_block:").await? {
            let Some(ip) = key.strip_prefix("ip_block:") else {
                continue;
            };
            let Ok(record) = serde_json::from_str::<BlockRecord>(&value) else {
                continue;
            };
            let remaining_seconds = match record.kind {
                BlockKind::Temporary => {
                    self.store.ttl(&key).await?.flatten().map(|d| d.as_secs())
                }
                _ => None,
            };
            blocked.push(BlockedIp {
                ip: ip.to_string(),
                kind: record.kind,
                reason: record.reason,
                blocked_at: record.blocked_at,
                remaining_seconds,
            });
        }
        blocked.sort_by(|a, b| a.ip.cmp(&b.ip));
        Ok(blocked)
    }

    /// Current whitelist, sorted by address.
    pub async fn whitelist(&self) -> Result<Vec<WhitelistEntry>> {
        let mut entries: Vec<WhitelistEntry> = self
            .store
            .scan_prefix("whitelist:")
            .await?
            .into_iter()
            .filter_map(|(_, value)| serde_json::from_str(&value).ok())
            .collect();
        entries.sort_by(|a, b| a.ip.cmp(&b.ip));
        Ok(entries)
    }

    pub async fn is_whitelisted(&self, canonical_ip: &str) -> Result<bool> {
        Ok(self.store.get(&whitelist_key(canonical_ip)).await?.is_some())
    }

    /// Escalation policy: `base * 2^(offense - 1)`, clamped to the cap.
    /// Monotonically non-decreasing because the offense count never shrinks.
    fn block_duration(&self, offense_count: i64) -> u64 {
        let exponent = (offense_count.max(1) - 1).min(32) as u32;
        self.config
            .base_block_secs
            .saturating_mul(1u64 << exponent)
            .min(self.config.max_block_secs)
    }

    async fn block_record(&self, canonical_ip: &str) -> Result<Option<BlockRecord>> {
        Ok(self
            .store
            .get(&block_key(canonical_ip))
            .await?
            .and_then(|v| serde_json::from_str(&v).ok()))
    }

    async fn whitelist_entry(&self, canonical_ip: &str) -> Result<Option<WhitelistEntry>> {
        Ok(self
            .store
            .get(&whitelist_key(canonical_ip))
            .await?
            .and_then(|v| serde_json::from_str(&v).ok()))
    }

    async fn counter(&self, key: &str) -> Result<i64> {
        Ok(self
            .store
            .get(key)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }
}
