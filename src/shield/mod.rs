//! Bot shield: proof-of-work challenges, honeypot detection, trust markers.

mod challenge;
mod engine;

pub use challenge::{generate_nonce, meets_difficulty, Challenge, ChallengeState, StoredChallenge};
pub use engine::{ShieldEngine, VerifyFailure, VerifyOutcome};
