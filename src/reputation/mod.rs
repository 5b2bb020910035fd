//! IP reputation: failure counting, escalating blocks, whitelist.

mod tracker;
mod types;

pub use tracker::ReputationTracker;
pub use types::{
    BlockKind, BlockOutcome, BlockRecord, BlockedIp, CacheKeyKind, FailureKind, IpStatus,
    WhitelistEntry,
};
