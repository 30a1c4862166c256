use ledgerlite_core::LedgerError;
use std::fmt;

/// Errors from node registration, stored-block validation and resolution.
///
/// Peer failures during resolution are recorded in the report rather than
/// returned; `PeerUnreachable` surfaces only when a single peer is queried.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsensusError {
    /// Peer could not be reached or returned an unusable response
    PeerUnreachable { address: String, reason: String },

    /// Address is empty after normalisation
    InvalidNodeAddress(String),

    /// Not enough active nodes to validate
    NetworkNotReady { active: usize, required: usize },

    /// Block has already been validated or rejected
    BlockNotPending(String),

    Ledger(LedgerError),
}

impl fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusError::PeerUnreachable { address, reason } => {
                write!(f, "Peer {} unreachable: {}", address, reason)
            }
            ConsensusError::InvalidNodeAddress(address) => {
                write!(f, "Invalid node address: {:?}", address)
            }
            ConsensusError::NetworkNotReady { active, required } => {
                write!(f, "Network not ready: {} active nodes, {} required", active, required)
            }
            ConsensusError::BlockNotPending(hash) => {
                write!(f, "Block {} is not pending validation", hash)
            }
            ConsensusError::Ledger(e) => write!(f, "Ledger error: {}", e),
        }
    }
}

impl std::error::Error for ConsensusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConsensusError::Ledger(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LedgerError> for ConsensusError {
    fn from(e: LedgerError) -> Self {
        ConsensusError::Ledger(e)
    }
}
