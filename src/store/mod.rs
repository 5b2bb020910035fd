//! Ephemeral shared-store abstraction.
//!
//! Every piece of hot-path state (reputation counters, blocks, whitelist,
//! challenges, trust markers) lives behind this trait with cache semantics:
//! TTL-bearing values, atomic increment, and compare-and-swap. Each state
//! machine transition in the gateway is a single primitive against one key,
//! so per-IP and per-nonce transitions stay linearizable without any
//! read-then-write in application code.
//!
//! The store is injected into the reputation tracker and shield engine
//! constructors; there is no process-wide singleton.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Store I/O failure. The in-process implementation is infallible, but the
/// trait keeps the error surface so a networked backend (Redis and friends)
/// can slot in without changing call sites.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store backend unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Key/value store with cache semantics.
///
/// Values are strings; callers serialize structured records with serde_json.
/// A `ttl` of `None` means the key does not expire.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a value, or `None` if absent or expired.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Set a value, replacing any existing one.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// Remove a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Atomically increment an integer value, creating it at `1` with the
    /// given TTL if absent or expired. Returns the post-increment count.
    /// The TTL is set only on creation, giving a fixed window per key.
    async fn incr(&self, key: &str, ttl: Option<Duration>) -> StoreResult<i64>;

    /// Atomically replace `key`'s value with `new` only if it currently
    /// equals `expected`. Returns whether the swap happened. Exactly one of
    /// any number of concurrent callers with the same `expected` wins.
    async fn compare_and_swap(&self, key: &str, expected: &str, new: &str) -> StoreResult<bool>;

    /// Set or clear the TTL on an existing key. No-op if the key is absent.
    async fn expire(&self, key: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// Remaining time before `key` expires. `None` if the key is absent;
    /// `Some(None)` if it exists without expiry.
    async fn ttl(&self, key: &str) -> StoreResult<Option<Option<Duration>>>;

    /// All live `(key, value)` pairs whose key starts with `prefix`.
    /// Used for the blocklist/whitelist admin listings; those keyspaces are
    /// small by construction.
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, String)>>;
}
