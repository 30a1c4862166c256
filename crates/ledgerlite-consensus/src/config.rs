use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for quorum gating and fork resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Registered nodes required before any block can validate
    pub min_nodes: usize,
    /// Fraction of registered nodes that must be active
    pub node_threshold: f64,
    /// A node seen within this many seconds counts as active
    pub activity_window_secs: u64,
    /// Nodes unseen for longer than this are evicted
    pub stale_after_secs: u64,
    /// Most recent blocks of a candidate chain passed through the quorum validator
    pub recent_blocks_checked: usize,
    pub peer_timeout_ms: u64,
    /// This node's own address; never fetched during resolution
    pub local_address: Option<String>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            min_nodes: 3,
            node_threshold: 0.67,
            activity_window_secs: 30 * 60,
            stale_after_secs: 30 * 60,
            recent_blocks_checked: 10,
            peer_timeout_ms: 5_000,
            local_address: None,
        }
    }
}

impl ConsensusConfig {
    pub fn activity_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.activity_window_secs as i64)
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_after_secs as i64)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    /// `ceil(total × threshold)`.
    pub fn threshold_nodes(&self, total: usize) -> usize {
        // the epsilon keeps exact products such as 3 × (2/3) from rounding up
        ((total as f64) * self.node_threshold - 1e-9).ceil().max(0.0) as usize
    }
}
