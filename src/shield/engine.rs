//! Proof-of-work challenge engine.
//!
//! Issues nonce challenges with volume-adaptive difficulty, verifies
//! solutions, detects honeypot submissions, and grants short-lived trust
//! markers. A nonce is consumable exactly once: consumption is a single
//! compare-and-swap on the stored challenge, so concurrent submissions of
//! the same nonce have exactly one winner.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::challenge::{
    generate_nonce, meets_difficulty, Challenge, ChallengeState, StoredChallenge,
};
use crate::config::ShieldConfig;
use crate::error::{parse_ip, Result};
use crate::journal::{EventJournal, EventType, SecurityEvent};
use crate::reputation::{FailureKind, ReputationTracker};
use crate::store::CacheStore;

fn challenge_key(nonce: &str) -> String {
    format!("shield:challenge:{nonce}")
}

fn attempts_key(ip: &str) -> String {
    format!("shield:attempts:{ip}")
}

fn trust_key(ip: &str, fingerprint: &str) -> String {
    format!("shield:trust:{ip}:{fingerprint}")
}

/// How long an expired challenge stays readable in the store, so a late
/// submission is reported as expired rather than unknown.
const EXPIRY_GRACE_SECS: u64 = 60;

/// Why a submission was rejected. Logged and journaled, but the HTTP surface
/// collapses all of these to one generic rejection so probes learn nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyFailure {
    UnknownChallenge,
    AlreadyConsumed,
    Expired,
    BadSolution,
}

impl VerifyFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyFailure::UnknownChallenge => "unknown_challenge",
            VerifyFailure::AlreadyConsumed => "already_consumed",
            VerifyFailure::Expired => "expired",
            VerifyFailure::BadSolution => "bad_solution",
        }
    }
}

/// Outcome of a verification. Rejections are values, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Solution accepted; a trust marker was set if a fingerprint was given.
    Verified,
    /// Honeypot field was filled in. The IP is now permanently blocked.
    Honeypot,
    Invalid(VerifyFailure),
}

pub struct ShieldEngine {
    store: Arc<dyn CacheStore>,
    journal: Arc<EventJournal>,
    tracker: Arc<ReputationTracker>,
    config: ShieldConfig,
}

impl ShieldEngine {
    pub fn new(
        store: Arc<dyn CacheStore>,
        journal: Arc<EventJournal>,
        tracker: Arc<ReputationTracker>,
        config: ShieldConfig,
    ) -> Self {
        Self {
            store,
            journal,
            tracker,
            config,
        }
    }

    /// Issue a fresh challenge for an IP. Each issuance counts as one recent
    /// attempt, so sustained challenge traffic from one IP raises its own
    /// difficulty.
    pub async fn issue_challenge(&self, ip: &str) -> Result<Challenge> {
        let ip = parse_ip(ip)?;
        let attempts = self.track_attempt(&ip).await?;
        let difficulty = self.current_difficulty(attempts);

        let nonce = generate_nonce();
        let issued_at = chrono::Utc::now();
        let expires_at =
            issued_at + chrono::Duration::seconds(self.config.challenge_ttl_secs as i64);
        let stored = StoredChallenge {
            difficulty,
            state: ChallengeState::Issued,
            issued_at,
            expires_at,
        };
        self.store
            .set(
                &challenge_key(&nonce),
                &serde_json::to_string(&stored).unwrap_or_else(|_| "{}".to_string()),
                Some(Duration::from_secs(
                    self.config.challenge_ttl_secs + EXPIRY_GRACE_SECS,
                )),
            )
            .await?;

        debug!(ip = %ip, difficulty, attempts, "issued shield challenge");
        Ok(Challenge {
            nonce,
            difficulty,
            issued_at,
            expires_at,
        })
    }

    /// Verify a submitted solution. Checks run honeypot first, then nonce
    /// consumption, then expiry, then the proof of work: a bot that fills
    /// the trap is
    /// blocked even when it solved the puzzle correctly, and the nonce is
    /// burned before any hash comparison so a wrong solution still consumes
    /// its challenge.
    pub async fn verify_solution(
        &self,
        ip: &str,
        nonce: &str,
        solution: &str,
        fingerprint: Option<&str>,
        honeypot: Option<&str>,
    ) -> Result<VerifyOutcome> {
        let ip = parse_ip(ip)?;

        if honeypot.is_some_and(|v| !v.trim().is_empty()) {
            warn!(ip = %ip, "honeypot field filled, blocking permanently");
            self.journal
                .append(SecurityEvent::new(EventType::ShieldHoneypot, &ip))
                .await?;
            self.tracker
                .block_permanently(&ip, "shield honeypot triggered")
                .await?;
            return Ok(VerifyOutcome::Honeypot);
        }

        let stored = match self.consume_challenge(nonce).await? {
            Ok(stored) => stored,
            Err(failure) => {
                self.reject(&ip, failure).await?;
                return Ok(VerifyOutcome::Invalid(failure));
            }
        };

        // The store key outlives `expires_at` by the grace period, so a
        // remaining TTL at or below the grace means the challenge lapsed.
        let remaining_secs = self
            .store
            .ttl(&challenge_key(nonce))
            .await?
            .flatten()
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if remaining_secs <= EXPIRY_GRACE_SECS {
            self.reject(&ip, VerifyFailure::Expired).await?;
            return Ok(VerifyOutcome::Invalid(VerifyFailure::Expired));
        }

        if !meets_difficulty(nonce, solution, stored.difficulty) {
            self.reject(&ip, VerifyFailure::BadSolution).await?;
            return Ok(VerifyOutcome::Invalid(VerifyFailure::BadSolution));
        }

        let fingerprint = fingerprint.map(str::trim).filter(|f| !f.is_empty());
        if let Some(fp) = fingerprint {
            self.store
                .set(
                    &trust_key(&ip, fp),
                    "1",
                    Some(Duration::from_secs(self.config.trust_ttl_secs)),
                )
                .await?;
        }

        self.journal
            .append(
                SecurityEvent::new(EventType::ShieldVerified, &ip)
                    .with_metadata("difficulty", &stored.difficulty.to_string()),
            )
            .await?;

        Ok(VerifyOutcome::Verified)
    }

    /// Whether this IP/fingerprint pair holds a live trust marker.
    pub async fn is_trusted(&self, ip: &str, fingerprint: &str) -> Result<bool> {
        let ip = parse_ip(ip)?;
        let fingerprint = fingerprint.trim();
        if fingerprint.is_empty() {
            return Ok(false);
        }
        Ok(self.store.get(&trust_key(&ip, fingerprint)).await?.is_some())
    }

    /// Drop all recent-attempt counters, resetting difficulty to the floor.
    pub async fn clear_attempts(&self) -> Result<u64> {
        let keys = self.store.scan_prefix("shield:attempts:").await?;
        let count = keys.len() as u64;
        for (key, _) in keys {
            self.store.delete(&key).await?;
        }
        Ok(count)
    }

    /// Difficulty grows one bit per `attempts_per_step` recent attempts,
    /// clamped to the configured range.
    pub fn current_difficulty(&self, recent_attempts: i64) -> u8 {
        let extra = (recent_attempts.max(0) / self.config.attempts_per_step).min(32) as u8;
        self.config
            .min_difficulty
            .saturating_add(extra)
            .min(self.config.max_difficulty)
    }

    async fn track_attempt(&self, canonical_ip: &str) -> Result<i64> {
        Ok(self
            .store
            .incr(
                &attempts_key(canonical_ip),
                Some(Duration::from_secs(self.config.attempt_window_secs)),
            )
            .await?)
    }

    /// Atomically flip a nonce from issued to consumed. The compare-and-swap
    /// is the commit point; a lost race reads back as already consumed.
    async fn consume_challenge(
        &self,
        nonce: &str,
    ) -> Result<std::result::Result<StoredChallenge, VerifyFailure>> {
        let key = challenge_key(nonce);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(Err(VerifyFailure::UnknownChallenge));
        };
        let Ok(stored) = serde_json::from_str::<StoredChallenge>(&raw) else {
            return Ok(Err(VerifyFailure::UnknownChallenge));
        };
        if stored.state == ChallengeState::Consumed {
            return Ok(Err(VerifyFailure::AlreadyConsumed));
        }

        let consumed = StoredChallenge {
            state: ChallengeState::Consumed,
            ..stored.clone()
        };
        let swapped = self
            .store
            .compare_and_swap(
                &key,
                &raw,
                &serde_json::to_string(&consumed).unwrap_or_else(|_| "{}".to_string()),
            )
            .await?;
        if !swapped {
            return Ok(Err(VerifyFailure::AlreadyConsumed));
        }
        Ok(Ok(stored))
    }

    async fn reject(&self, canonical_ip: &str, failure: VerifyFailure) -> Result<()> {
        debug!(ip = %canonical_ip, reason = failure.as_str(), "shield verification failed");
        // Failed submissions count toward difficulty scaling just like
        // issuance does, so hammering verify with bogus nonces raises the
        // IP's difficulty too.
        self.track_attempt(canonical_ip).await?;
        self.journal
            .append(
                SecurityEvent::new(EventType::ShieldFailed, canonical_ip)
                    .with_metadata("reason", failure.as_str()),
            )
            .await?;
        self.tracker
            .record_failure(canonical_ip, FailureKind::Shield)
            .await?;
        Ok(())
    }
}
