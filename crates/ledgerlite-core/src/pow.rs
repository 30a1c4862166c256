// PROOF-OF-WORK
// Brute-force nonce search over SHA256(previous_hash ‖ transactions ‖ nonce).
//
// The search has no upper bound. Each extra unit of difficulty multiplies the
// expected work by 16.

use crate::block::serialize_transactions;
use crate::transaction::Transaction;
use log::{debug, info};
use sha2::{Digest, Sha256};

/// Leading zero hex characters required when none is configured.
pub const DEFAULT_DIFFICULTY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofOfWork {
    /// Number of leading '0' characters required in the hex digest
    difficulty: usize,
    target: String,
}

impl Default for ProofOfWork {
    fn default() -> Self {
        Self::new(DEFAULT_DIFFICULTY)
    }
}

impl ProofOfWork {
    pub fn new(difficulty: usize) -> Self {
        Self {
            difficulty,
            target: "0".repeat(difficulty),
        }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn meets_target(&self, hash: &str) -> bool {
        hash.starts_with(&self.target)
    }

    pub fn hash_with_nonce(&self, previous_hash: &str, transactions: &[Transaction], nonce: u64) -> String {
        crate::block::calculate_hash(previous_hash, transactions, nonce)
    }

    /// Search nonces from 0 upward and return the first that meets the target
    /// together with the resulting block hash.
    pub fn find_proof(&self, previous_hash: &str, transactions: &[Transaction]) -> (u64, String) {
        let mut prefix = Sha256::new();
        prefix.update(previous_hash.as_bytes());
        prefix.update(serialize_transactions(transactions).as_bytes());

        let mut nonce: u64 = 0;
        loop {
            let mut hasher = prefix.clone();
            hasher.update(nonce.to_string().as_bytes());
            let hash = hex::encode(hasher.finalize());

            if self.meets_target(&hash) {
                info!(
                    "PoW found: difficulty={}, nonce={}, hash={}",
                    self.difficulty,
                    nonce,
                    &hash[..16]
                );
                return (nonce, hash);
            }
            if nonce > 0 && nonce % 1_000_000 == 0 {
                debug!("PoW search at nonce {} (difficulty {})", nonce, self.difficulty);
            }
            nonce = nonce.wrapping_add(1);
        }
    }

    pub fn find_nonce(&self, previous_hash: &str, transactions: &[Transaction]) -> u64 {
        self.find_proof(previous_hash, transactions).0
    }

    pub fn is_valid_proof(&self, nonce: u64, previous_hash: &str, transactions: &[Transaction]) -> bool {
        self.meets_target(&self.hash_with_nonce(previous_hash, transactions, nonce))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{calculate_hash, GENESIS_PREVIOUS_HASH};
    use proptest::prelude::*;

    #[test]
    fn test_found_nonce_is_valid() {
        let pow = ProofOfWork::new(2);
        let txs = vec![Transaction::system("miner", 10.0).unwrap()];
        let (nonce, hash) = pow.find_proof(GENESIS_PREVIOUS_HASH, &txs);
        assert!(pow.is_valid_proof(nonce, GENESIS_PREVIOUS_HASH, &txs));
        assert!(hash.starts_with("00"));
        assert_eq!(hash, calculate_hash(GENESIS_PREVIOUS_HASH, &txs, nonce));
    }

    #[test]
    fn test_zero_difficulty_accepts_first_nonce() {
        let pow = ProofOfWork::new(0);
        assert_eq!(pow.find_nonce(GENESIS_PREVIOUS_HASH, &[]), 0);
    }

    #[test]
    fn test_wrong_nonce_rejected() {
        let pow = ProofOfWork::new(3);
        let nonce = pow.find_nonce("ab", &[]);
        // the first valid nonce is minimal, so every smaller one fails
        for candidate in 0..nonce {
            assert!(!pow.is_valid_proof(candidate, "ab", &[]));
        }
    }

    #[test]
    fn test_default_difficulty() {
        assert_eq!(ProofOfWork::default().difficulty(), DEFAULT_DIFFICULTY);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_find_then_verify(prev in "[0-9a-f]{64}", difficulty in 0usize..=2) {
            let pow = ProofOfWork::new(difficulty);
            let (nonce, hash) = pow.find_proof(&prev, &[]);
            prop_assert!(pow.is_valid_proof(nonce, &prev, &[]));
            prop_assert!(hash.chars().take(difficulty).all(|c| c == '0'));
        }
    }
}
