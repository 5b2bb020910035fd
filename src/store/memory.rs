//! In-process `CacheStore` backed by a concurrent map.
//!
//! Expiry is lazy: reads treat an expired entry as absent, and a periodic
//! `purge_expired` sweep reclaims memory. Mutations go through the map's
//! entry API so each one is atomic per key.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::{CacheStore, StoreResult};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory store. Cheap to clone-share behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Drop every expired entry. Called from the housekeeping loop.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }

    /// Number of live entries (test helper and stats).
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|e| !e.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn expiry(ttl: Option<Duration>) -> Option<Instant> {
    ttl.map(|d| Instant::now() + d)
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: expiry(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> StoreResult<i64> {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: "0".to_string(),
            expires_at: expiry(ttl),
        });
        if entry.is_expired(now) {
            entry.value = "0".to_string();
            entry.expires_at = expiry(ttl);
        }
        let count = entry.value.parse::<i64>().unwrap_or(0) + 1;
        entry.value = count.to_string();
        Ok(count)
    }

    async fn compare_and_swap(&self, key: &str, expected: &str, new: &str) -> StoreResult<bool> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) && entry.value == expected => {
                entry.value = new.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire(&self, key: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let now = Instant::now();
        if let Some(mut entry) = self.entries.get_mut(key) {
            if !entry.is_expired(now) {
                entry.expires_at = expiry(ttl);
            }
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Option<Duration>>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.expires_at.map(|at| at.saturating_duration_since(now))))
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, String)>> {
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && !e.value().is_expired(now))
            .map(|e| (e.key().clone(), e.value().value.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert!(store.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.ttl("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_window_reset() {
        let store = MemoryStore::new();
        let ttl = Some(Duration::from_secs(60));
        assert_eq!(store.incr("c", ttl).await.unwrap(), 1);
        assert_eq!(store.incr("c", ttl).await.unwrap(), 2);

        // Window expiry resets the counter
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.incr("c", ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_compare_and_swap_single_winner() {
        let store = MemoryStore::new();
        store.set("k", "issued", None).await.unwrap();

        assert!(store.compare_and_swap("k", "issued", "consumed").await.unwrap());
        // Second swap against the stale expected value loses
        assert!(!store.compare_and_swap("k", "issued", "consumed").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("consumed".to_string()));
    }

    #[tokio::test]
    async fn test_cas_absent_key_fails() {
        let store = MemoryStore::new();
        assert!(!store.compare_and_swap("nope", "a", "b").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_sets_and_clears_ttl() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), Some(None));

        // Attach a TTL to a previously persistent key
        store.expire("k", Some(Duration::from_secs(5))).await.unwrap();
        assert!(store.ttl("k").await.unwrap().flatten().is_some());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get("k").await.unwrap(), None);

        // Clearing the TTL makes a key persistent again
        store
            .set("p", "v", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        store.expire("p", None).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get("p").await.unwrap(), Some("v".to_string()));
        assert_eq!(store.ttl("p").await.unwrap(), Some(None));
    }

    #[tokio::test]
    async fn test_expire_absent_key_is_noop() {
        let store = MemoryStore::new();
        store
            .expire("missing", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store
            .set("short", "v", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        store.set("keep", "v", None).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        store.purge_expired();
        assert_eq!(store.len(), 1);
        assert!(store.get("keep").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_scan_prefix() {
        let store = MemoryStore::new();
        store.set("block:1.1.1.1", "a", None).await.unwrap();
        store.set("block:2.2.2.2", "b", None).await.unwrap();
        store.set("whitelist:3.3.3.3", "c", None).await.unwrap();

        let blocks = store.scan_prefix("block:").await.unwrap();
        assert_eq!(blocks.len(), 2);
    }
}
