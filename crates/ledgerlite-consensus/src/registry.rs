use crate::error::ConsensusError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A known peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Registration sequence number
    pub id: u64,
    pub address: String,
    pub last_seen: DateTime<Utc>,
}

/// Normalise a peer address to `host[:port][/path]`: trimmed, without URL
/// scheme or trailing slash.
pub fn normalize_address(raw: &str) -> Result<String, ConsensusError> {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed);
    let address = without_scheme.trim_end_matches('/');
    if address.is_empty() || address.contains(char::is_whitespace) {
        return Err(ConsensusError::InvalidNodeAddress(raw.to_string()));
    }
    Ok(address.to_string())
}

/// Registered nodes keyed by normalised address.
///
/// Iteration is in address lexical order, which is also the order used for
/// primary selection.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: BTreeMap<String, NodeRecord>,
    next_id: u64,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh `address`. Returns the record and whether it was new.
    pub fn upsert(&mut self, address: &str, seen_at: DateTime<Utc>) -> (NodeRecord, bool) {
        if let Some(record) = self.nodes.get_mut(address) {
            record.last_seen = record.last_seen.max(seen_at);
            return (record.clone(), false);
        }
        self.next_id += 1;
        let record = NodeRecord {
            id: self.next_id,
            address: address.to_string(),
            last_seen: seen_at,
        };
        self.nodes.insert(address.to_string(), record.clone());
        (record, true)
    }

    /// Refresh last-seen for a known node; unknown addresses are ignored.
    pub fn touch(&mut self, address: &str, seen_at: DateTime<Utc>) -> bool {
        match self.nodes.get_mut(address) {
            Some(record) => {
                record.last_seen = record.last_seen.max(seen_at);
                true
            }
            None => false,
        }
    }

    /// Drop every node last seen before `cutoff` and return them.
    pub fn remove_stale(&mut self, cutoff: DateTime<Utc>) -> Vec<NodeRecord> {
        let stale: Vec<String> = self
            .nodes
            .values()
            .filter(|n| n.last_seen < cutoff)
            .map(|n| n.address.clone())
            .collect();
        stale.iter().filter_map(|a| self.nodes.remove(a)).collect()
    }

    pub fn get(&self, address: &str) -> Option<&NodeRecord> {
        self.nodes.get(address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.nodes.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Addresses in lexical order.
    pub fn addresses(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn nodes(&self) -> Vec<NodeRecord> {
        self.nodes.values().cloned().collect()
    }

    /// Node at `position` in lexical order.
    pub fn nth(&self, position: usize) -> Option<&NodeRecord> {
        self.nodes.values().nth(position)
    }

    /// Nodes with `last_seen >= cutoff`.
    pub fn active_count(&self, cutoff: DateTime<Utc>) -> usize {
        self.nodes.values().filter(|n| n.last_seen >= cutoff).count()
    }
}
