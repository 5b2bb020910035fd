//! Proof-of-work challenge primitives.
//!
//! A challenge is a random nonce plus a difficulty in leading zero bits. A
//! solution is any string whose SHA-256 over `"{nonce}:{solution}"` starts
//! with at least that many zero bits. Difficulty is exponential: each extra
//! bit doubles the expected client work while verification stays one hash.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Challenge as handed to a client.
#[derive(Debug, Clone, Serialize)]
pub struct Challenge {
    pub nonce: String,
    /// Required leading zero bits of the solution hash.
    pub difficulty: u8,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Lifecycle of a stored challenge. A consumed nonce stays in the store
/// until its TTL lapses so replays are distinguishable from expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeState {
    Issued,
    Consumed,
}

/// Server-side challenge record (key `shield:challenge:{nonce}`). The store
/// key outlives `expires_at` by a grace period so a late submission reads
/// back as expired rather than unknown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChallenge {
    pub difficulty: u8,
    pub state: ChallengeState,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// 128 bits of OS randomness, hex encoded.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Whether `solution` satisfies the challenge at the given difficulty.
pub fn meets_difficulty(nonce: &str, solution: &str, difficulty: u8) -> bool {
    let mut hasher = Sha256::new();
    hasher.update(nonce.as_bytes());
    hasher.update(b":");
    hasher.update(solution.as_bytes());
    has_leading_zero_bits(&hasher.finalize(), difficulty)
}

fn has_leading_zero_bits(hash: &[u8], bits: u8) -> bool {
    let full_bytes = (bits / 8) as usize;
    let remainder = bits % 8;

    if hash.len() < full_bytes + usize::from(remainder > 0) {
        return false;
    }
    if hash[..full_bytes].iter().any(|&b| b != 0) {
        return false;
    }
    if remainder > 0 {
        let mask = 0xFFu8 << (8 - remainder);
        if hash[full_bytes] & mask != 0 {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_is_hex_128_bits() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), 32);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(nonce, generate_nonce());
    }

    #[test]
    fn test_leading_zero_bits_byte_boundaries() {
        let hash = [0x00, 0xFF, 0x00];
        assert!(has_leading_zero_bits(&hash, 0));
        assert!(has_leading_zero_bits(&hash, 8));
        assert!(!has_leading_zero_bits(&hash, 9));

        let hash = [0x0F, 0x00];
        assert!(has_leading_zero_bits(&hash, 4));
        assert!(!has_leading_zero_bits(&hash, 5));
    }

    #[test]
    fn test_zero_difficulty_accepts_anything() {
        assert!(meets_difficulty("abc", "whatever", 0));
    }

    #[test]
    fn test_solution_can_be_brute_forced() {
        let nonce = "00112233445566778899aabbccddeeff";
        let solution = (0u64..)
            .map(|i| i.to_string())
            .find(|s| meets_difficulty(nonce, s, 4))
            .unwrap();
        assert!(meets_difficulty(nonce, &solution, 4));
        // A found solution is bound to its nonce
        assert!(!meets_difficulty("ffeeddccbbaa99887766554433221100", &solution, 32));
    }
}
