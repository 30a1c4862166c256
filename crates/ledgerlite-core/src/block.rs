use crate::transaction::{truncate_timestamp, Transaction};
use crate::validation::ValidationError;
use chrono::{DateTime, Utc};
use ledgerlite_crypto::{canonical_value, sha256_hex};
use serde::{Deserialize, Serialize};

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    #[default]
    Pending,
    Validated,
    Invalid,
}

/// A block in the chain.
///
/// INVARIANTS:
/// 1. hash == SHA256(previous_hash ‖ serialize_transactions(transactions) ‖ nonce)
/// 2. previous_hash is the hash of the preceding block, or the genesis sentinel
/// 3. Only the validation fields change after the block is stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// 1-based position, assigned by the store
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: String,
    pub hash: String,
    pub nonce: u64,
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub validation_status: ValidationStatus,
    #[serde(default)]
    pub validation_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub validation_errors: Option<Vec<ValidationError>>,
}

/// Canonical JSON array of the hashed content of each transaction.
pub fn serialize_transactions(transactions: &[Transaction]) -> String {
    let items = transactions
        .iter()
        .map(|tx| serde_json::to_value(tx.hashed_content()).unwrap_or(serde_json::Value::Null))
        .collect();
    canonical_value(serde_json::Value::Array(items)).to_string()
}

pub fn calculate_hash(previous_hash: &str, transactions: &[Transaction], nonce: u64) -> String {
    let mut data = String::with_capacity(previous_hash.len() + 64);
    data.push_str(previous_hash);
    data.push_str(&serialize_transactions(transactions));
    data.push_str(&nonce.to_string());
    sha256_hex(data.as_bytes())
}

impl Block {
    pub fn genesis(timestamp: DateTime<Utc>) -> Self {
        Self {
            index: 1,
            timestamp: truncate_timestamp(timestamp),
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            hash: calculate_hash(GENESIS_PREVIOUS_HASH, &[], 0),
            nonce: 0,
            transactions: Vec::new(),
            validation_status: ValidationStatus::Pending,
            validation_timestamp: None,
            validation_errors: None,
        }
    }

    /// Unstored block; the store assigns `index`.
    pub fn new(previous_hash: String, hash: String, nonce: u64, transactions: Vec<Transaction>) -> Self {
        Self {
            index: 0,
            timestamp: truncate_timestamp(Utc::now()),
            previous_hash,
            hash,
            nonce,
            transactions,
            validation_status: ValidationStatus::Pending,
            validation_timestamp: None,
            validation_errors: None,
        }
    }

    pub fn has_genesis_parent(&self) -> bool {
        self.previous_hash == GENESIS_PREVIOUS_HASH
    }

    /// Genesis shape: sentinel parent, no transactions, nonce 0.
    pub fn is_genesis(&self) -> bool {
        self.has_genesis_parent() && self.transactions.is_empty() && self.nonce == 0
    }

    pub fn recompute_hash(&self) -> String {
        calculate_hash(&self.previous_hash, &self.transactions, self.nonce)
    }

    pub fn hash_matches(&self) -> bool {
        self.recompute_hash() == self.hash
    }

    pub fn is_pending(&self) -> bool {
        self.validation_status == ValidationStatus::Pending
    }
}
