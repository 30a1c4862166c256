//! Multi-node agreement for ledgerlite.
//!
//! [`quorum::QuorumValidator`] gates block validation on node liveness and
//! checks block integrity. [`manager::ConsensusManager`] keeps the node
//! registry, fetches peer chains and replaces the local chain when a better
//! one is found.
//!
//! The quorum gate is a single-phase liveness check over registered nodes. It
//! exchanges no votes and no signed attestations.

pub mod config;
pub mod error;
pub mod manager;
pub mod peer;
pub mod quorum;
pub mod registry;

pub use config::ConsensusConfig;
pub use error::ConsensusError;
pub use manager::{ConsensusManager, ResolutionReport, SyncState, SyncStatus};
pub use peer::{HttpPeerClient, PeerClient, PeerError};
pub use quorum::{BlockValidation, NetworkStatus, QuorumValidator};
pub use registry::{normalize_address, NodeRecord, NodeRegistry};
