use crate::config::NodeConfig;
use anyhow::{Context, Result};
use ledgerlite_consensus::{ConsensusManager, HttpPeerClient, PeerClient};
use ledgerlite_core::Ledger;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Build a manager over an in-memory ledger, registering bootstrap peers.
pub fn build_manager(config: &NodeConfig, client: Option<Arc<dyn PeerClient>>) -> Result<ConsensusManager> {
    let consensus = config.consensus_config();
    let client: Arc<dyn PeerClient> = match client {
        Some(client) => client,
        None => Arc::new(
            HttpPeerClient::new(consensus.peer_timeout()).context("building HTTP peer client")?,
        ),
    };
    let ledger = Arc::new(Ledger::in_memory(config.difficulty).context("opening ledger")?);
    let manager = ConsensusManager::new(ledger, client, consensus).context("creating consensus manager")?;

    if let Some(own) = &config.node_address {
        manager.register_node(own).context("registering own address")?;
    }
    if !config.bootstrap_peers.is_empty() {
        manager
            .register_nodes(&config.bootstrap_peers)
            .context("registering bootstrap peers")?;
    }
    Ok(manager)
}

/// One maintenance pass: evict stale nodes, then resolve against peers.
pub async fn sync_once(manager: &ConsensusManager) -> Result<()> {
    // this node is always live to itself
    if let Some(own) = manager.local_address().map(str::to_string) {
        manager.register_node(&own).context("refreshing own address")?;
    }
    let removed = manager.remove_stale_nodes();
    if !removed.is_empty() {
        info!(removed = removed.len(), "evicted stale nodes");
    }
    let report = manager.resolve().await.context("resolution pass failed")?;
    info!(
        replaced = report.replaced,
        length = report.length_after,
        unreachable = report.unreachable.len(),
        view = manager.view(),
        "sync pass complete"
    );
    Ok(())
}

/// Run sync passes every `config.sync_interval()` until `shutdown` resolves.
/// A failed pass is logged and the loop continues.
pub async fn run_sync_loop<F>(manager: Arc<ConsensusManager>, config: &NodeConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(config.sync_interval());
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                return Ok(());
            }
            _ = ticker.tick() => {
                if let Err(e) = sync_once(&manager).await {
                    warn!("{:#}", e);
                }
            }
        }
    }
}
