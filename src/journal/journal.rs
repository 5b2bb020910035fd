//! Append-only security event journal.
//!
//! Holds a bounded in-memory ring of recent events and, when configured,
//! mirrors every append into Postgres for durability. Queries and pruning go
//! to Postgres when it is enabled, otherwise to the ring. Appends are also
//! mirrored to `tracing` for immediate operator visibility.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::event::{EventFilter, EventPage, EventType, Retain, SecurityEvent};
use super::repository::JournalRepository;
use crate::error::{GatewayError, Result};

/// Hard cap on page size so a query cannot drag the whole journal over the wire.
pub const MAX_PAGE_SIZE: usize = 200;

pub struct EventJournal {
    repository: Option<JournalRepository>,
    ring: RwLock<VecDeque<SecurityEvent>>,
    max_entries: usize,
}

impl EventJournal {
    pub fn new(max_entries: usize) -> Self {
        Self {
            repository: None,
            ring: RwLock::new(VecDeque::new()),
            max_entries,
        }
    }

    pub fn with_repository(mut self, repository: JournalRepository) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Append an event. Never rejects well-formed input; store failures
    /// propagate after the in-memory ring has recorded the event.
    pub async fn append(&self, event: SecurityEvent) -> Result<()> {
        match event.event_type {
            EventType::IpBlockedTemporary
            | EventType::IpBlockedPermanent
            | EventType::ShieldHoneypot => warn!(
                event_type = event.event_type.as_str(),
                ip = %event.ip,
                "security event"
            ),
            _ => info!(
                event_type = event.event_type.as_str(),
                ip = %event.ip,
                "security event"
            ),
        }

        {
            let mut ring = self.ring.write().await;
            ring.push_back(event.clone());
            while ring.len() > self.max_entries {
                ring.pop_front();
            }
        }

        if let Some(ref repo) = self.repository {
            repo.insert_event(&event).await?;
        }
        Ok(())
    }

    /// Filtered, paginated query, newest first. `page` is 1-based.
    pub async fn query(
        &self,
        filter: &EventFilter,
        page: usize,
        page_size: usize,
    ) -> Result<EventPage> {
        self.query_types(filter, None, page, page_size).await
    }

    /// Look up a single event by id.
    pub async fn get(&self, id: &str) -> Result<Option<SecurityEvent>> {
        if let Some(ref repo) = self.repository {
            return repo.get_event(id).await;
        }
        let ring = self.ring.read().await;
        Ok(ring.iter().find(|e| e.id == id).cloned())
    }

    /// Remove events older than the retention cutoff (or all of them).
    /// Returns the number removed.
    pub async fn prune(&self, retain: Retain) -> Result<u64> {
        self.prune_types(retain, None).await
    }

    /// Per-type event counts over the trailing `days`.
    pub async fn stats(&self, days: u32) -> Result<HashMap<&'static str, u64>> {
        self.stats_types(days, None).await
    }

    pub(super) async fn query_types(
        &self,
        filter: &EventFilter,
        types: Option<&[EventType]>,
        page: usize,
        page_size: usize,
    ) -> Result<EventPage> {
        if let (Some(from), Some(to)) = (filter.date_from, filter.date_to) {
            if from > to {
                return Err(GatewayError::validation("date_from is after date_to"));
            }
        }
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

        if let Some(ref repo) = self.repository {
            let (events, total) = repo.query_events(filter, types, page, page_size).await?;
            return Ok(EventPage {
                events,
                page,
                page_size,
                total,
            });
        }

        let ring = self.ring.read().await;
        let matching: Vec<&SecurityEvent> = ring
            .iter()
            .rev()
            .filter(|e| types.map_or(true, |ts| ts.contains(&e.event_type)))
            .filter(|e| filter.matches(e))
            .collect();
        let total = matching.len();
        let events = matching
            .into_iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .cloned()
            .collect();
        Ok(EventPage {
            events,
            page,
            page_size,
            total,
        })
    }

    pub(super) async fn prune_types(
        &self,
        retain: Retain,
        types: Option<&[EventType]>,
    ) -> Result<u64> {
        let cutoff = match retain {
            Retain::Days(days) => Some(chrono::Utc::now() - chrono::Duration::days(days as i64)),
            Retain::All => None,
        };

        let removed_memory = {
            let mut ring = self.ring.write().await;
            let before = ring.len();
            ring.retain(|e| {
                if types.is_some_and(|ts| !ts.contains(&e.event_type)) {
                    return true;
                }
                match cutoff {
                    Some(cutoff) => e.occurred_at >= cutoff,
                    None => false,
                }
            });
            (before - ring.len()) as u64
        };

        if let Some(ref repo) = self.repository {
            return repo.prune_events(cutoff, types).await;
        }
        Ok(removed_memory)
    }

    pub(super) async fn stats_types(
        &self,
        days: u32,
        types: Option<&[EventType]>,
    ) -> Result<HashMap<&'static str, u64>> {
        let since = chrono::Utc::now() - chrono::Duration::days(days as i64);

        if let Some(ref repo) = self.repository {
            return repo.count_by_type(since, types).await;
        }

        let ring = self.ring.read().await;
        let mut counts: HashMap<&'static str, u64> = HashMap::new();
        for t in types.unwrap_or(&EventType::ALL) {
            counts.insert(t.as_str(), 0);
        }
        for event in ring.iter() {
            if event.occurred_at < since {
                continue;
            }
            if types.is_some_and(|ts| !ts.contains(&event.event_type)) {
                continue;
            }
            *counts.entry(event.event_type.as_str()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

/// View over the journal restricted to shield events, for the focused
/// operational endpoints. Pruning through this view leaves all other event
/// types untouched.
#[derive(Clone)]
pub struct ShieldJournal {
    journal: Arc<EventJournal>,
}

impl ShieldJournal {
    pub fn new(journal: Arc<EventJournal>) -> Self {
        Self { journal }
    }

    pub async fn query(&self, page: usize, page_size: usize) -> Result<EventPage> {
        self.journal
            .query_types(&EventFilter::default(), Some(&EventType::SHIELD), page, page_size)
            .await
    }

    pub async fn prune(&self, retain: Retain) -> Result<u64> {
        self.journal.prune_types(retain, Some(&EventType::SHIELD)).await
    }

    pub async fn stats(&self, days: u32) -> Result<HashMap<&'static str, u64>> {
        self.journal.stats_types(days, Some(&EventType::SHIELD)).await
    }
}
