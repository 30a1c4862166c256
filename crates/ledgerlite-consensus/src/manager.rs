// CONSENSUS MANAGER
// Node registry ownership, peer chain fetch and fork resolution.
//
// SELECTION RULE (evaluated in registry order):
// 1. the primary's chain is adopted when len >= best and it validates
// 2. any other chain must be strictly longer than best and validate
// 3. unreachable peers are skipped; an unreachable primary causes one view change
// 4. the winner replaces the local chain only if the local tip is unchanged
//    since the start of the pass

use crate::config::ConsensusConfig;
use crate::error::ConsensusError;
use crate::peer::{PeerClient, PeerError};
use crate::quorum::{BlockValidation, NetworkStatus, QuorumValidator};
use crate::registry::{normalize_address, NodeRecord, NodeRegistry};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use ledgerlite_core::{Block, ChainResponse, Ledger, LedgerError};
use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What one resolution pass saw and did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub replaced: bool,
    pub adopted_from: Option<String>,
    pub length_before: usize,
    pub length_after: usize,
    /// Primary at the start of the pass
    pub primary: Option<String>,
    pub peers_queried: usize,
    pub unreachable: Vec<String>,
    /// Peers whose chain qualified on length but failed validation
    pub rejected: Vec<String>,
    pub view_changed: bool,
    /// The local chain advanced during the pass and the selection was dropped
    #[serde(default)]
    pub tip_moved: bool,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No resolution pass has run yet
    Unknown,
    /// Last pass found no better chain
    Synced,
    /// Last pass replaced the local chain
    Updated,
}

/// Sync summary derived from the last resolution report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub state: SyncState,
    pub last_sync: Option<DateTime<Utc>>,
    pub chain_length: usize,
    pub peers_queried: usize,
    pub unreachable_peers: usize,
}

pub struct ConsensusManager {
    ledger: Arc<Ledger>,
    registry: Arc<RwLock<NodeRegistry>>,
    validator: QuorumValidator,
    client: Arc<dyn PeerClient>,
    local_address: Option<String>,
    last_report: RwLock<Option<ResolutionReport>>,
}

impl ConsensusManager {
    pub fn new(
        ledger: Arc<Ledger>,
        client: Arc<dyn PeerClient>,
        config: ConsensusConfig,
    ) -> Result<Self, ConsensusError> {
        let local_address = config
            .local_address
            .as_deref()
            .map(normalize_address)
            .transpose()?;
        let registry = Arc::new(RwLock::new(NodeRegistry::new()));
        let validator = QuorumValidator::new(config, registry.clone());
        Ok(Self {
            ledger,
            registry,
            validator,
            client,
            local_address,
            last_report: RwLock::new(None),
        })
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn validator(&self) -> &QuorumValidator {
        &self.validator
    }

    pub fn config(&self) -> &ConsensusConfig {
        self.validator.config()
    }

    pub fn local_address(&self) -> Option<&str> {
        self.local_address.as_deref()
    }

    pub fn primary(&self) -> Option<String> {
        self.validator.primary()
    }

    pub fn view(&self) -> u64 {
        self.validator.view()
    }

    pub fn network_status(&self) -> NetworkStatus {
        self.validator.network_status()
    }

    pub fn nodes(&self) -> Vec<NodeRecord> {
        self.registry.read().nodes()
    }

    /// Upsert a node and refresh its last-seen time.
    pub fn register_node(&self, address: &str) -> Result<NodeRecord, ConsensusError> {
        let address = normalize_address(address)?;
        let (record, created) = self.registry.write().upsert(&address, Utc::now());
        self.validator.ensure_primary();
        if created {
            info!("Registered node {} (id {})", record.address, record.id);
        } else {
            debug!("Refreshed node {}", record.address);
        }
        Ok(record)
    }

    /// Register a batch. Every address is normalised before any is stored.
    pub fn register_nodes<I, S>(&self, addresses: I) -> Result<Vec<NodeRecord>, ConsensusError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized = addresses
            .into_iter()
            .map(|a| normalize_address(a.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let now = Utc::now();
        let records = {
            let mut registry = self.registry.write();
            normalized
                .iter()
                .map(|a| registry.upsert(a, now).0)
                .collect::<Vec<_>>()
        };
        self.validator.ensure_primary();
        info!("Registered {} nodes", records.len());
        Ok(records)
    }

    /// Evict nodes not seen within the stale window. Returns their addresses.
    pub fn remove_stale_nodes(&self) -> Vec<String> {
        let primary = self.validator.primary();
        let cutoff = Utc::now() - self.config().stale_after();
        let removed: Vec<String> = self
            .registry
            .write()
            .remove_stale(cutoff)
            .into_iter()
            .map(|n| n.address)
            .collect();

        if removed.is_empty() {
            return removed;
        }
        info!("Removed {} stale nodes: {:?}", removed.len(), removed);
        if primary.as_ref().map_or(false, |p| removed.contains(p)) {
            self.validator.initiate_view_change();
        } else {
            self.validator.ensure_primary();
        }
        removed
    }

    /// `/chain` body for this node.
    pub fn chain_response(&self) -> ChainResponse {
        ChainResponse::from_chain(&self.ledger.chain(), self.validator.primary())
    }

    /// Full chain check plus quorum validation of the most recent blocks,
    /// with previous hashes resolved inside the candidate itself.
    pub fn validate_candidate(&self, chain: &[Block]) -> bool {
        if !self.ledger.is_valid_chain(chain) {
            return false;
        }
        let recent = self.config().recent_blocks_checked;
        for block in chain.iter().rev().take(recent) {
            let validation = self.validator.validate_block(block, chain);
            if !validation.valid {
                warn!(
                    "Candidate block {} failed quorum validation: {:?}",
                    block.index, validation.errors
                );
                return false;
            }
        }
        true
    }

    /// Fetch every peer's chain and adopt the best one, if any.
    pub async fn resolve(&self) -> Result<ResolutionReport, ConsensusError> {
        let local_tip = self.ledger.tip().ok_or(LedgerError::MissingGenesis)?;
        let length_before = local_tip.index as usize;
        let primary = self.validator.primary();
        let peers: Vec<String> = self
            .registry
            .read()
            .addresses()
            .into_iter()
            .filter(|a| Some(a.as_str()) != self.local_address.as_deref())
            .collect();

        let timeout = self.config().peer_timeout();
        let fetches = peers.iter().map(|address| {
            let client = self.client.clone();
            async move {
                let result = match tokio::time::timeout(timeout, client.fetch_chain(address)).await {
                    Ok(result) => result,
                    Err(_) => Err(PeerError::Timeout {
                        address: address.clone(),
                        after_ms: timeout.as_millis() as u64,
                    }),
                };
                (address.clone(), result)
            }
        });
        let results = join_all(fetches).await;

        let mut best_length = length_before;
        let mut best: Option<(String, Vec<Block>)> = None;
        let mut unreachable = Vec::new();
        let mut rejected = Vec::new();
        let mut view_changed = false;

        for (address, result) in results {
            let is_primary = primary.as_deref() == Some(address.as_str());
            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    let error = ConsensusError::PeerUnreachable {
                        address: address.clone(),
                        reason: e.to_string(),
                    };
                    warn!("{}", error);
                    if is_primary && !view_changed {
                        self.validator.initiate_view_change();
                        view_changed = true;
                    }
                    unreachable.push(address);
                    continue;
                }
            };
            self.registry.write().touch(&address, Utc::now());

            if !response.is_consistent() {
                warn!(
                    "Peer {} reported length {} for {} blocks",
                    address,
                    response.length,
                    response.chain.len()
                );
                rejected.push(address);
                continue;
            }

            let length = response.length;
            let qualifies = if is_primary {
                length >= best_length
            } else {
                length > best_length
            };
            if !qualifies {
                continue;
            }

            let chain = response.into_blocks();
            if self.validate_candidate(&chain) {
                debug!("Peer {} offers a valid chain of length {}", address, length);
                best_length = length;
                best = Some((address, chain));
            } else {
                rejected.push(address);
            }
        }

        let mut adopted_from = None;
        let mut tip_moved = false;
        if let Some((address, chain)) = best {
            // an identical chain from the primary is not a replacement
            if chain.len() == length_before && chain.last().map(|b| &b.hash) == Some(&local_tip.hash) {
                debug!("Primary {} already agrees with the local chain", address);
            } else {
                match self.ledger.replace_chain_if(chain, &local_tip.hash) {
                    Ok(()) => {
                        info!("Adopted chain of length {} from {}", best_length, address);
                        adopted_from = Some(address);
                    }
                    Err(LedgerError::TipMoved { actual, .. }) => {
                        warn!(
                            "Local tip moved to {} during resolution; keeping the local chain over {}",
                            actual, address
                        );
                        tip_moved = true;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let report = ResolutionReport {
            replaced: adopted_from.is_some(),
            adopted_from,
            length_before,
            length_after: self.ledger.len(),
            primary,
            peers_queried: peers.len(),
            unreachable,
            rejected,
            view_changed,
            tip_moved,
            completed_at: Utc::now(),
        };
        *self.last_report.write() = Some(report.clone());
        Ok(report)
    }

    /// True iff the local chain was replaced.
    pub async fn resolve_conflicts(&self) -> Result<bool, ConsensusError> {
        Ok(self.resolve().await?.replaced)
    }

    /// Swap the local chain for `chain`, all or nothing.
    pub fn replace_chain(&self, chain: Vec<Block>) -> Result<(), ConsensusError> {
        self.ledger.replace_chain(chain)?;
        Ok(())
    }

    /// Validate a stored pending block against the local chain and record
    /// the outcome on it.
    pub fn validate_stored_block(&self, hash: &str) -> Result<BlockValidation, ConsensusError> {
        let block = self
            .ledger
            .block_by_hash(hash)
            .ok_or_else(|| LedgerError::BlockNotFound(hash.to_string()))?;
        if !block.is_pending() {
            return Err(ConsensusError::BlockNotPending(hash.to_string()));
        }
        let status = self.validator.network_status();
        if !status.is_ready {
            return Err(ConsensusError::NetworkNotReady {
                active: status.active_nodes,
                required: status.required_nodes,
            });
        }

        let validation = self.validator.validate_block(&block, self.ledger.as_ref());
        self.ledger.record_validation(hash, validation.errors.clone())?;
        if validation.valid {
            info!("Block {} validated", block.index);
        } else {
            warn!("Block {} marked invalid: {:?}", block.index, validation.errors);
        }
        Ok(validation)
    }

    pub fn last_report(&self) -> Option<ResolutionReport> {
        self.last_report.read().clone()
    }

    /// Summary of the last resolution pass. Never triggers a new one.
    pub fn sync_status(&self) -> SyncStatus {
        let report = self.last_report.read();
        let (state, last_sync, peers_queried, unreachable_peers) = match report.as_ref() {
            None => (SyncState::Unknown, None, 0, 0),
            Some(r) => (
                if r.replaced { SyncState::Updated } else { SyncState::Synced },
                Some(r.completed_at),
                r.peers_queried,
                r.unreachable.len(),
            ),
        };
        SyncStatus {
            state,
            last_sync,
            chain_length: self.ledger.len(),
            peers_queried,
            unreachable_peers,
        }
    }
}
