//! Event Journal
//!
//! Append-only store of typed security events: pure storage plus filtered,
//! paginated query and retention pruning. Every other component writes here;
//! nothing here calls back out.
//!
//! ```text
//! journal/
//! ├── event.rs      - SecurityEvent, EventType, filters, pages
//! ├── journal.rs    - EventJournal (bounded ring + optional Postgres)
//! └── repository.rs - sqlx/Postgres persistence
//! ```

mod event;
#[allow(clippy::module_inception)]
mod journal;
mod repository;

pub use event::{EventFilter, EventPage, EventType, Retain, SecurityEvent};
pub use journal::{EventJournal, ShieldJournal, MAX_PAGE_SIZE};
pub use repository::JournalRepository;
