//! Peer wire format for `GET /chain`.

use crate::block::{Block, ValidationStatus};
use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionView {
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub system: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockView {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: String,
    pub hash: String,
    pub nonce: u64,
    pub transactions: Vec<TransactionView>,
}

/// Body of a peer's `GET /chain` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainResponse {
    pub chain: Vec<BlockView>,
    pub length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_node: Option<String>,
}

impl From<&Transaction> for TransactionView {
    fn from(tx: &Transaction) -> Self {
        Self {
            sender: tx.sender.clone(),
            recipient: tx.recipient.clone(),
            amount: tx.amount,
            timestamp: Some(tx.timestamp),
            signature: tx.signature.clone(),
            public_key: tx.public_key.clone(),
            system: tx.system,
        }
    }
}

impl TransactionView {
    /// Rebuild a transaction; a missing timestamp falls back to `block_timestamp`.
    pub fn into_transaction(self, block_timestamp: DateTime<Utc>) -> Transaction {
        Transaction {
            id: None,
            sender: self.sender,
            recipient: self.recipient,
            amount: self.amount,
            timestamp: self.timestamp.unwrap_or(block_timestamp),
            signature: self.signature,
            public_key: self.public_key,
            block_id: None,
            system: self.system,
        }
    }
}

impl From<&Block> for BlockView {
    fn from(block: &Block) -> Self {
        Self {
            index: block.index,
            timestamp: block.timestamp,
            previous_hash: block.previous_hash.clone(),
            hash: block.hash.clone(),
            nonce: block.nonce,
            transactions: block.transactions.iter().map(TransactionView::from).collect(),
        }
    }
}

impl BlockView {
    /// Peer blocks arrive unvalidated locally.
    pub fn into_block(self) -> Block {
        let timestamp = self.timestamp;
        Block {
            index: self.index,
            timestamp,
            previous_hash: self.previous_hash,
            hash: self.hash,
            nonce: self.nonce,
            transactions: self
                .transactions
                .into_iter()
                .map(|tx| tx.into_transaction(timestamp))
                .collect(),
            validation_status: ValidationStatus::Pending,
            validation_timestamp: None,
            validation_errors: None,
        }
    }
}

impl ChainResponse {
    pub fn from_chain(chain: &[Block], primary_node: Option<String>) -> Self {
        Self {
            chain: chain.iter().map(BlockView::from).collect(),
            length: chain.len(),
            primary_node,
        }
    }

    /// True when the advertised length agrees with the blocks sent.
    pub fn is_consistent(&self) -> bool {
        self.length == self.chain.len()
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.chain.into_iter().map(BlockView::into_block).collect()
    }
}
