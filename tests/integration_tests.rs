//! Integration tests for the Flint security gateway
//!
//! These tests verify end-to-end flows across the reputation tracker,
//! shield engine, event journal, and alert engine, all running against the
//! in-memory store.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use flint_gateway::config::{ReputationConfig, ShieldConfig};
use flint_gateway::shield::meets_difficulty;
use flint_gateway::{
    AlertEngine, BlockKind, BlockOutcome, CacheStore, EventFilter, EventJournal, EventType,
    FailureKind, MemoryStore, ReputationTracker, SecurityEvent, ShieldEngine, ShieldJournal,
    VerifyOutcome,
};

// ============================================================================
// Test Helpers
// ============================================================================

struct Gateway {
    tracker: Arc<ReputationTracker>,
    engine: Arc<ShieldEngine>,
    journal: Arc<EventJournal>,
}

fn create_gateway() -> Gateway {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let journal = Arc::new(EventJournal::new(100_000));
    let tracker = Arc::new(ReputationTracker::new(
        store.clone(),
        journal.clone(),
        ReputationConfig::default(),
    ));
    let engine = Arc::new(ShieldEngine::new(
        store,
        journal.clone(),
        tracker.clone(),
        ShieldConfig::default(),
    ));
    Gateway {
        tracker,
        engine,
        journal,
    }
}

fn solve(nonce: &str, difficulty: u8) -> String {
    (0u64..)
        .map(|i| i.to_string())
        .find(|s| meets_difficulty(nonce, s, difficulty))
        .expect("exhausted solution space")
}

// ============================================================================
// Reputation Flows
// ============================================================================

#[tokio::test]
async fn test_five_failures_trigger_automatic_block() {
    let gw = create_gateway();

    for _ in 0..5 {
        gw.tracker
            .record_failure("203.0.113.5", FailureKind::Login)
            .await
            .unwrap();
    }

    let status = gw.tracker.check_status("203.0.113.5").await.unwrap();
    assert!(status.is_blocked);
    assert_eq!(status.block_kind, BlockKind::Temporary);
    assert_eq!(status.failed_attempts, 5);
    assert_eq!(status.offense_count, 1);
    assert!(status.remaining_seconds.is_some());

    // The journal recorded every failure and the block itself
    let failures = gw
        .journal
        .query(
            &EventFilter {
                event_type: Some(EventType::FailedAttempt),
                ip: Some("203.0.113.5".to_string()),
                ..Default::default()
            },
            1,
            50,
        )
        .await
        .unwrap();
    assert_eq!(failures.total, 5);

    let blocks = gw
        .journal
        .query(
            &EventFilter {
                event_type: Some(EventType::IpBlockedTemporary),
                ..Default::default()
            },
            1,
            50,
        )
        .await
        .unwrap();
    assert_eq!(blocks.total, 1);
}

#[tokio::test]
async fn test_whitelisted_ip_is_never_blocked() {
    let gw = create_gateway();
    gw.tracker
        .add_to_whitelist("10.0.0.1", "office network")
        .await
        .unwrap();

    assert_eq!(
        gw.tracker
            .block_permanently("10.0.0.1", "abuse")
            .await
            .unwrap(),
        BlockOutcome::Denied
    );
    assert_eq!(
        gw.tracker
            .block_temporarily("10.0.0.1", "abuse")
            .await
            .unwrap(),
        BlockOutcome::Denied
    );

    // Even a failure storm cannot block it
    for _ in 0..20 {
        gw.tracker
            .record_failure("10.0.0.1", FailureKind::Login)
            .await
            .unwrap();
    }

    let status = gw.tracker.check_status("10.0.0.1").await.unwrap();
    assert!(!status.is_blocked);
    assert_eq!(status.block_kind, BlockKind::None);
    assert!(gw
        .tracker
        .blocklist()
        .await
        .unwrap()
        .iter()
        .all(|b| b.ip != "10.0.0.1"));
}

#[tokio::test]
async fn test_escalation_across_repeat_offenses() {
    let gw = create_gateway();

    let first = gw
        .tracker
        .block_temporarily("203.0.113.5", "abuse")
        .await
        .unwrap()
        .seconds_blocked()
        .unwrap();
    gw.tracker.unblock("203.0.113.5").await.unwrap();

    let second = gw
        .tracker
        .block_temporarily("203.0.113.5", "abuse")
        .await
        .unwrap()
        .seconds_blocked()
        .unwrap();

    let status = gw.tracker.check_status("203.0.113.5").await.unwrap();
    assert_eq!(status.offense_count, 2);
    assert!(second >= first);
}

#[tokio::test(start_paused = true)]
async fn test_temporary_block_lapses_with_time() {
    let gw = create_gateway();
    let seconds = gw
        .tracker
        .block_temporarily("203.0.113.5", "abuse")
        .await
        .unwrap()
        .seconds_blocked()
        .unwrap();

    assert!(gw.tracker.check_status("203.0.113.5").await.unwrap().is_blocked);
    tokio::time::advance(Duration::from_secs(seconds + 1)).await;
    assert!(!gw.tracker.check_status("203.0.113.5").await.unwrap().is_blocked);
}

// ============================================================================
// Shield Flows
// ============================================================================

#[tokio::test]
async fn test_challenge_verify_and_trust_flow() {
    let gw = create_gateway();

    let challenge = gw.engine.issue_challenge("198.51.100.7").await.unwrap();
    assert_eq!(challenge.difficulty, 4);

    let solution = solve(&challenge.nonce, challenge.difficulty);
    let outcome = gw
        .engine
        .verify_solution("198.51.100.7", &challenge.nonce, &solution, Some("fp-9"), None)
        .await
        .unwrap();
    assert_eq!(outcome, VerifyOutcome::Verified);
    assert!(gw.engine.is_trusted("198.51.100.7", "fp-9").await.unwrap());

    // The same nonce can never verify twice
    let replay = gw
        .engine
        .verify_solution("198.51.100.7", &challenge.nonce, &solution, None, None)
        .await
        .unwrap();
    assert!(matches!(replay, VerifyOutcome::Invalid(_)));
}

#[tokio::test]
async fn test_honeypot_blocks_permanently_despite_valid_proof() {
    let gw = create_gateway();

    let challenge = gw.engine.issue_challenge("198.51.100.7").await.unwrap();
    let solution = solve(&challenge.nonce, challenge.difficulty);

    let outcome = gw
        .engine
        .verify_solution(
            "198.51.100.7",
            &challenge.nonce,
            &solution,
            None,
            Some("I am a bot"),
        )
        .await
        .unwrap();
    assert_eq!(outcome, VerifyOutcome::Honeypot);

    let status = gw.tracker.check_status("198.51.100.7").await.unwrap();
    assert!(status.is_blocked);
    assert_eq!(status.block_kind, BlockKind::Permanent);
    assert_eq!(status.remaining_seconds, None);
}

#[tokio::test]
async fn test_difficulty_rises_with_attempt_volume() {
    let gw = create_gateway();

    let quiet = gw.engine.issue_challenge("198.51.100.7").await.unwrap();
    assert_eq!(quiet.difficulty, 4);

    for _ in 0..1_000 {
        gw.engine.issue_challenge("198.51.100.7").await.unwrap();
    }
    let busy = gw.engine.issue_challenge("198.51.100.7").await.unwrap();
    assert!(busy.difficulty > quiet.difficulty);
    assert!(busy.difficulty <= 12);

    // Other IPs are unaffected
    let other = gw.engine.issue_challenge("203.0.113.5").await.unwrap();
    assert_eq!(other.difficulty, 4);
}

#[tokio::test]
async fn test_shield_failures_feed_reputation() {
    let gw = create_gateway();

    // Five bad submissions cross the failure threshold
    for _ in 0..5 {
        let challenge = gw.engine.issue_challenge("198.51.100.7").await.unwrap();
        let wrong = (0u64..)
            .map(|i| format!("wrong-{i}"))
            .find(|s| !meets_difficulty(&challenge.nonce, s, challenge.difficulty))
            .unwrap();
        let outcome = gw
            .engine
            .verify_solution("198.51.100.7", &challenge.nonce, &wrong, None, None)
            .await
            .unwrap();
        assert!(matches!(outcome, VerifyOutcome::Invalid(_)));
    }

    let status = gw.tracker.check_status("198.51.100.7").await.unwrap();
    assert!(status.is_blocked);
    assert_eq!(status.failed_attempts, 5);
}

// ============================================================================
// Journal Flows
// ============================================================================

#[tokio::test]
async fn test_journal_filter_by_type_newest_first_with_bounds() {
    let gw = create_gateway();
    let before = Utc::now() - ChronoDuration::seconds(1);

    for ip in ["203.0.113.5", "198.51.100.7", "192.0.2.9"] {
        let challenge = gw.engine.issue_challenge(ip).await.unwrap();
        let solution = solve(&challenge.nonce, challenge.difficulty);
        gw.engine
            .verify_solution(ip, &challenge.nonce, &solution, None, None)
            .await
            .unwrap();
    }
    let after = Utc::now() + ChronoDuration::seconds(1);

    let page = gw
        .journal
        .query(
            &EventFilter {
                event_type: Some(EventType::ShieldVerified),
                date_from: Some(before),
                date_to: Some(after),
                ..Default::default()
            },
            1,
            50,
        )
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert!(page
        .events
        .iter()
        .all(|e| e.event_type == EventType::ShieldVerified));
    // Newest first
    assert_eq!(page.events[0].ip, "192.0.2.9");
    assert_eq!(page.events[2].ip, "203.0.113.5");

    // A window entirely in the past matches nothing
    let empty = gw
        .journal
        .query(
            &EventFilter {
                event_type: Some(EventType::ShieldVerified),
                date_to: Some(before - ChronoDuration::hours(1)),
                ..Default::default()
            },
            1,
            50,
        )
        .await
        .unwrap();
    assert_eq!(empty.total, 0);
}

#[tokio::test]
async fn test_prune_by_age_and_truncate() {
    let journal = Arc::new(EventJournal::new(1000));

    // Two old events and one fresh one
    for _ in 0..2 {
        let mut event = SecurityEvent::new(EventType::FailedAttempt, "203.0.113.5");
        event.occurred_at = Utc::now() - ChronoDuration::days(40);
        journal.append(event).await.unwrap();
    }
    journal
        .append(SecurityEvent::new(EventType::FailedAttempt, "203.0.113.5"))
        .await
        .unwrap();

    let removed = journal
        .prune(flint_gateway::Retain::Days(30))
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(
        journal.query(&EventFilter::default(), 1, 10).await.unwrap().total,
        1
    );

    let removed = journal.prune(flint_gateway::Retain::All).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(
        journal.query(&EventFilter::default(), 1, 10).await.unwrap().total,
        0
    );
}

#[tokio::test]
async fn test_shield_journal_view_is_isolated() {
    let gw = create_gateway();

    // One reputation event and one shield event
    gw.tracker
        .record_failure("203.0.113.5", FailureKind::Login)
        .await
        .unwrap();
    let challenge = gw.engine.issue_challenge("198.51.100.7").await.unwrap();
    let solution = solve(&challenge.nonce, challenge.difficulty);
    gw.engine
        .verify_solution("198.51.100.7", &challenge.nonce, &solution, None, None)
        .await
        .unwrap();

    let shield = ShieldJournal::new(gw.journal.clone());
    let page = shield.query(1, 50).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.events[0].event_type, EventType::ShieldVerified);

    // Clearing the shield view leaves the reputation history intact
    shield.prune(flint_gateway::Retain::All).await.unwrap();
    let rest = gw.journal.query(&EventFilter::default(), 1, 50).await.unwrap();
    assert!(rest.total >= 1);
    assert!(rest.events.iter().all(|e| !e.event_type.is_shield()));
}

// ============================================================================
// Alert Flows
// ============================================================================

#[tokio::test]
async fn test_alerts_surface_attack_patterns() {
    let gw = create_gateway();
    let alerts = AlertEngine::new(gw.journal.clone());

    assert_eq!(alerts.alert_count().await.unwrap(), 0);

    // A failure burst from one IP and a honeypot hit
    for _ in 0..12 {
        gw.tracker
            .record_failure("203.0.113.5", FailureKind::Login)
            .await
            .unwrap();
    }
    gw.engine
        .verify_solution("198.51.100.7", "whatever", "0", None, Some("bot"))
        .await
        .unwrap();

    let computed = alerts.compute_alerts().await.unwrap();
    let names: Vec<&str> = computed.iter().map(|a| a.rule).collect();
    assert!(names.contains(&"failed_attempt_burst"));
    assert!(names.contains(&"honeypot_hits"));

    let burst = computed
        .iter()
        .find(|a| a.rule == "failed_attempt_burst")
        .unwrap();
    assert_eq!(burst.scope, "203.0.113.5");
    assert_eq!(burst.count, 12);
}
