//! ledgerlite node: configuration, logging setup and the sync loop that ties
//! the ledger to the consensus manager.

pub mod config;
pub mod node;
pub mod telemetry;

pub use config::{ConfigError, NodeConfig};
pub use node::{build_manager, run_sync_loop};

pub use ledgerlite_consensus as consensus;
pub use ledgerlite_core as core;
pub use ledgerlite_crypto as crypto;
