//! Derived security alerts.
//!
//! Alerts are not stored anywhere: each call re-evaluates a fixed rule set
//! against the recent journal and returns a ranked projection. Correctness
//! never depends on caching.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::journal::{EventFilter, EventJournal, EventType, SecurityEvent, MAX_PAGE_SIZE};

/// How a rule aggregates matching events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    /// One alert per IP that crosses the threshold.
    PerIp,
    /// A single alert over all matching events.
    Global,
}

/// Static alert rule: fire when `event_type` occurs at least `threshold`
/// times within the trailing window.
#[derive(Debug, Clone)]
pub struct AlertRule {
    pub name: &'static str,
    pub event_type: EventType,
    pub scope: RuleScope,
    pub threshold: u64,
    pub window_minutes: u32,
}

/// A fired rule, computed fresh on every query.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub rule: &'static str,
    /// The offending IP for per-IP rules, `"global"` otherwise.
    pub scope: String,
    pub count: u64,
    pub window_minutes: u32,
}

pub struct AlertEngine {
    journal: Arc<EventJournal>,
    rules: Vec<AlertRule>,
}

impl AlertEngine {
    pub fn new(journal: Arc<EventJournal>) -> Self {
        Self {
            journal,
            rules: Self::default_rules(),
        }
    }

    pub fn with_rules(journal: Arc<EventJournal>, rules: Vec<AlertRule>) -> Self {
        Self { journal, rules }
    }

    fn default_rules() -> Vec<AlertRule> {
        vec![
            AlertRule {
                name: "failed_attempt_burst",
                event_type: EventType::FailedAttempt,
                scope: RuleScope::PerIp,
                threshold: 10,
                window_minutes: 15,
            },
            AlertRule {
                name: "shield_failure_burst",
                event_type: EventType::ShieldFailed,
                scope: RuleScope::PerIp,
                threshold: 10,
                window_minutes: 15,
            },
            AlertRule {
                name: "honeypot_hits",
                event_type: EventType::ShieldHoneypot,
                scope: RuleScope::Global,
                threshold: 1,
                window_minutes: 60,
            },
            AlertRule {
                name: "permanent_block_volume",
                event_type: EventType::IpBlockedPermanent,
                scope: RuleScope::Global,
                threshold: 5,
                window_minutes: 24 * 60,
            },
        ]
    }

    /// Evaluate every rule, highest count first.
    pub async fn compute_alerts(&self) -> Result<Vec<Alert>> {
        let mut alerts = Vec::new();
        for rule in &self.rules {
            let since =
                chrono::Utc::now() - chrono::Duration::minutes(rule.window_minutes as i64);
            let events = self.collect_since(rule.event_type, since).await?;

            match rule.scope {
                RuleScope::Global => {
                    let count = events.len() as u64;
                    if count >= rule.threshold {
                        alerts.push(Alert {
                            rule: rule.name,
                            scope: "global".to_string(),
                            count,
                            window_minutes: rule.window_minutes,
                        });
                    }
                }
                RuleScope::PerIp => {
                    let mut per_ip: HashMap<&str, u64> = HashMap::new();
                    for event in &events {
                        *per_ip.entry(event.ip.as_str()).or_insert(0) += 1;
                    }
                    for (ip, count) in per_ip {
                        if count >= rule.threshold {
                            alerts.push(Alert {
                                rule: rule.name,
                                scope: ip.to_string(),
                                count,
                                window_minutes: rule.window_minutes,
                            });
                        }
                    }
                }
            }
        }

        alerts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.scope.cmp(&b.scope)));
        Ok(alerts)
    }

    pub async fn alert_count(&self) -> Result<usize> {
        Ok(self.compute_alerts().await?.len())
    }

    /// All events of one type since the cutoff, paging through the journal.
    async fn collect_since(
        &self,
        event_type: EventType,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<SecurityEvent>> {
        let filter = EventFilter {
            event_type: Some(event_type),
            date_from: Some(since),
            ..Default::default()
        };

        let mut events = Vec::new();
        let mut page = 1;
        loop {
            let result = self.journal.query(&filter, page, MAX_PAGE_SIZE).await?;
            let done = events.len() + result.events.len() >= result.total;
            events.extend(result.events);
            if done {
                break;
            }
            page += 1;
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed(journal: &EventJournal, event_type: EventType, ip: &str, n: usize) {
        for _ in 0..n {
            journal
                .append(SecurityEvent::new(event_type, ip))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_quiet_journal_raises_nothing() {
        let journal = Arc::new(EventJournal::new(1000));
        let engine = AlertEngine::new(journal);
        assert!(engine.compute_alerts().await.unwrap().is_empty());
        assert_eq!(engine.alert_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_per_ip_burst_fires_per_offender() {
        let journal = Arc::new(EventJournal::new(1000));
        seed(&journal, EventType::FailedAttempt, "203.0.113.5", 12).await;
        seed(&journal, EventType::FailedAttempt, "198.51.100.7", 3).await;

        let engine = AlertEngine::new(journal);
        let alerts = engine.compute_alerts().await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule, "failed_attempt_burst");
        assert_eq!(alerts[0].scope, "203.0.113.5");
        assert_eq!(alerts[0].count, 12);
    }

    #[tokio::test]
    async fn test_single_honeypot_hit_is_global_alert() {
        let journal = Arc::new(EventJournal::new(1000));
        seed(&journal, EventType::ShieldHoneypot, "203.0.113.5", 1).await;

        let engine = AlertEngine::new(journal);
        let alerts = engine.compute_alerts().await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule, "honeypot_hits");
        assert_eq!(alerts[0].scope, "global");
    }

    #[tokio::test]
    async fn test_ranked_by_count_descending() {
        let journal = Arc::new(EventJournal::new(1000));
        seed(&journal, EventType::FailedAttempt, "203.0.113.5", 11).await;
        seed(&journal, EventType::ShieldFailed, "198.51.100.7", 25).await;
        seed(&journal, EventType::ShieldHoneypot, "192.0.2.9", 2).await;

        let engine = AlertEngine::new(journal);
        let alerts = engine.compute_alerts().await.unwrap();
        assert_eq!(alerts.len(), 3);
        assert_eq!(alerts[0].count, 25);
        assert_eq!(alerts[1].count, 11);
        assert_eq!(alerts[2].count, 2);
    }

    #[tokio::test]
    async fn test_events_outside_window_ignored() {
        let journal = Arc::new(EventJournal::new(1000));
        for _ in 0..20 {
            let mut event = SecurityEvent::new(EventType::FailedAttempt, "203.0.113.5");
            event.occurred_at = chrono::Utc::now() - chrono::Duration::hours(2);
            journal.append(event).await.unwrap();
        }

        let engine = AlertEngine::new(journal);
        assert!(engine.compute_alerts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pages_past_the_first_are_counted() {
        let journal = Arc::new(EventJournal::new(1000));
        seed(&journal, EventType::FailedAttempt, "203.0.113.5", 450).await;

        let engine = AlertEngine::new(journal);
        let alerts = engine.compute_alerts().await.unwrap();
        assert_eq!(alerts[0].count, 450);
    }
}
