// QUORUM VALIDATOR ("PBFT-lite")
// Primary selection by view plus a liveness-gated block integrity check.
//
// SAFETY CONSTRAINTS:
// 1. view only increases
// 2. primary = nodes[view mod n] with nodes in address lexical order
// 3. validate_block never touches shared state; its errors are returned
// 4. the view lock is always taken before the registry lock

use crate::config::ConsensusConfig;
use crate::registry::NodeRegistry;
use chrono::Utc;
use ledgerlite_core::{Block, BlockLookup, SignatureCheck, ValidationCode, ValidationError};
use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of [`QuorumValidator::validate_block`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockValidation {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

impl BlockValidation {
    fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn has_code(&self, code: ValidationCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }
}

/// Read-only quorum snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub total_nodes: usize,
    pub active_nodes: usize,
    pub required_nodes: usize,
    pub min_nodes: usize,
    pub threshold: f64,
    pub is_ready: bool,
}

#[derive(Debug, Default)]
struct ViewState {
    view: u64,
    primary: Option<String>,
}

pub struct QuorumValidator {
    config: ConsensusConfig,
    registry: Arc<RwLock<NodeRegistry>>,
    state: RwLock<ViewState>,
}

fn select_primary(registry: &NodeRegistry, view: u64) -> Option<String> {
    let count = registry.len() as u64;
    if count == 0 {
        return None;
    }
    registry.nth((view % count) as usize).map(|n| n.address.clone())
}

impl QuorumValidator {
    pub fn new(config: ConsensusConfig, registry: Arc<RwLock<NodeRegistry>>) -> Self {
        let primary = select_primary(&registry.read(), 0);
        Self {
            config,
            registry,
            state: RwLock::new(ViewState { view: 0, primary }),
        }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn view(&self) -> u64 {
        self.state.read().view
    }

    pub fn primary(&self) -> Option<String> {
        self.state.read().primary.clone()
    }

    pub fn is_primary(&self, address: &str) -> bool {
        self.state.read().primary.as_deref() == Some(address)
    }

    /// Advance the view and reassign the primary. With no registered nodes
    /// the primary becomes `None`.
    pub fn initiate_view_change(&self) -> u64 {
        let mut state = self.state.write();
        state.view += 1;
        let registry = self.registry.read();
        state.primary = select_primary(&registry, state.view);
        info!("View change: view={}, primary={:?}", state.view, state.primary);
        state.view
    }

    /// Reselect the primary if there is none or it left the registry.
    /// A live primary keeps its role when other nodes join.
    pub fn ensure_primary(&self) {
        let mut state = self.state.write();
        let registry = self.registry.read();
        let current_present = state
            .primary
            .as_deref()
            .map_or(false, |p| registry.contains(p));
        if !current_present {
            state.primary = select_primary(&registry, state.view);
            debug!("Primary set to {:?} at view {}", state.primary, state.view);
        }
    }

    pub fn network_status(&self) -> NetworkStatus {
        let cutoff = Utc::now() - self.config.activity_window();
        let registry = self.registry.read();
        let total_nodes = registry.len();
        let active_nodes = registry.active_count(cutoff);
        let required_nodes = self.config.min_nodes.max(self.config.threshold_nodes(total_nodes));
        NetworkStatus {
            total_nodes,
            active_nodes,
            required_nodes,
            min_nodes: self.config.min_nodes,
            threshold: self.config.node_threshold,
            is_ready: active_nodes >= required_nodes,
        }
    }

    /// Validate `block`, resolving its previous hash through `lookup`.
    ///
    /// Quorum failures stop early. Integrity failures are all collected.
    pub fn validate_block<L: BlockLookup + ?Sized>(&self, block: &Block, lookup: &L) -> BlockValidation {
        let status = self.network_status();

        if status.total_nodes < self.config.min_nodes {
            return BlockValidation::from_errors(vec![ValidationError::new(
                ValidationCode::InsufficientNodes,
                format!(
                    "{} registered nodes, at least {} required",
                    status.total_nodes, self.config.min_nodes
                ),
            )]);
        }

        let required_active = self.config.threshold_nodes(status.total_nodes);
        if status.active_nodes < required_active {
            return BlockValidation::from_errors(vec![ValidationError::new(
                ValidationCode::InactiveNodes,
                format!(
                    "{} of {} nodes active, {} required",
                    status.active_nodes, status.total_nodes, required_active
                ),
            )]);
        }

        let mut errors = Vec::new();

        if !block.has_genesis_parent() && !lookup.contains_hash(&block.previous_hash) {
            errors.push(ValidationError::new(
                ValidationCode::InvalidPrevHash,
                format!("previous block {} not found", block.previous_hash),
            ));
        }

        let recomputed = block.recompute_hash();
        if recomputed != block.hash {
            errors.push(ValidationError::new(
                ValidationCode::InvalidBlockHash,
                format!("stored hash {} does not match computed {}", block.hash, recomputed),
            ));
        }

        for (position, tx) in block.transactions.iter().enumerate() {
            if let Err(e) = tx.validate_amount() {
                errors.push(ValidationError::new(
                    ValidationCode::InvalidAmount,
                    format!("transaction {}: {}", position, e),
                ));
            }
            match tx.check_signature() {
                SignatureCheck::Exempt | SignatureCheck::Valid => {}
                SignatureCheck::Missing => errors.push(ValidationError::new(
                    ValidationCode::MissingSignature,
                    format!("transaction {} has no signature or public key", position),
                )),
                SignatureCheck::Invalid => errors.push(ValidationError::new(
                    ValidationCode::InvalidSignature,
                    format!("transaction {} signature does not verify", position),
                )),
                SignatureCheck::Malformed(reason) => errors.push(ValidationError::new(
                    ValidationCode::VerificationError,
                    format!("transaction {}: {}", position, reason),
                )),
            }
        }

        if !errors.is_empty() {
            debug!("Block {} failed validation with {} errors", block.hash, errors.len());
        }
        BlockValidation::from_errors(errors)
    }
}
