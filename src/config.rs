use config::{Config, Environment, File};
use ledgerlite_consensus::ConsensusConfig;
use ledgerlite_core::DEFAULT_DIFFICULTY;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment prefix; nested keys use `__`, e.g. `LEDGERLITE__CONSENSUS__MIN_NODES`.
pub const ENV_PREFIX: &str = "LEDGERLITE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Node settings. Every field has a default, so an empty source is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Address other nodes use to reach this one
    pub node_address: Option<String>,
    /// Leading zero hex characters required of block hashes
    pub difficulty: usize,
    pub consensus: ConsensusConfig,
    /// Peers registered at startup
    pub bootstrap_peers: Vec<String>,
    pub sync_interval_secs: u64,
    /// Default log filter when neither RUST_LOG nor --log-level is given
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_address: None,
            difficulty: DEFAULT_DIFFICULTY,
            consensus: ConsensusConfig::default(),
            bootstrap_peers: Vec::new(),
            sync_interval_secs: 30,
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load from an optional file plus `LEDGERLITE__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("bootstrap_peers")
                .try_parsing(true),
        );

        let config: NodeConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.difficulty > 64 {
            return Err(ConfigError::Invalid(format!(
                "difficulty {} exceeds the 64 hex characters of a hash",
                self.difficulty
            )));
        }
        let threshold = self.consensus.node_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "consensus.node_threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        if self.consensus.min_nodes == 0 {
            return Err(ConfigError::Invalid("consensus.min_nodes must be at least 1".into()));
        }
        if self.sync_interval_secs == 0 {
            return Err(ConfigError::Invalid("sync_interval_secs must be positive".into()));
        }
        Ok(())
    }

    /// Consensus settings with this node's own address filled in.
    pub fn consensus_config(&self) -> ConsensusConfig {
        let mut consensus = self.consensus.clone();
        if consensus.local_address.is_none() {
            consensus.local_address = self.node_address.clone();
        }
        consensus
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}
