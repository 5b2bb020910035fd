//! Flint Security Gateway
//!
//! Decision engine answering "is this request/IP trusted, and what evidence
//! do we have": IP reputation with escalating blocks and a whitelist, a
//! proof-of-work bot shield with honeypot detection and trust markers, an
//! append-only security event journal, and a derived alert engine.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Server entrypoint
//! ├── config.rs      - Configuration management
//! ├── error.rs       - Error taxonomy and input validation
//! ├── store/         - Ephemeral store abstraction
//! │   └── memory.rs  - In-process TTL store
//! ├── journal/       - Append-only security event journal
//! │   ├── event.rs      - Event types and query filters
//! │   ├── journal.rs    - Journal, shield-scoped view
//! │   └── repository.rs - PostgreSQL persistence
//! ├── reputation/    - IP reputation
//! │   ├── types.rs   - Block kinds, statuses, outcomes
//! │   └── tracker.rs - Failure counting, escalating blocks, whitelist
//! ├── shield/        - Bot shield
//! │   ├── challenge.rs - Nonce generation, PoW target check
//! │   └── engine.rs    - Issue/verify, adaptive difficulty, honeypot
//! ├── alerts/        - Derived alerts over the journal
//! └── api/           - HTTP API endpoints
//!     ├── middleware.rs - Admin auth, security headers, request logging
//!     ├── security.rs   - Admin surface (logs, blocks, whitelist)
//!     └── shield.rs     - Challenge flow and shield journal view
//! ```

pub mod alerts;
pub mod api;
pub mod config;
pub mod error;
pub mod journal;
pub mod reputation;
pub mod shield;
pub mod store;

// Re-export main types for convenience
pub use alerts::{Alert, AlertEngine, AlertRule, RuleScope};
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use journal::{
    EventFilter, EventJournal, EventPage, EventType, JournalRepository, Retain, SecurityEvent,
    ShieldJournal,
};
pub use reputation::{
    BlockKind, BlockOutcome, BlockedIp, CacheKeyKind, FailureKind, IpStatus, ReputationTracker,
    WhitelistEntry,
};
pub use shield::{Challenge, ShieldEngine, VerifyOutcome};
pub use store::{CacheStore, MemoryStore, StoreError};
