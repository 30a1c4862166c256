use async_trait::async_trait;
use ledgerlite_core::ChainResponse;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("peer {address} answered with HTTP {status}")]
    Status { address: String, status: u16 },

    #[error("could not decode chain response: {0}")]
    Decode(String),

    #[error("peer {address} did not answer within {after_ms} ms")]
    Timeout { address: String, after_ms: u64 },
}

/// Source of peer chains for fork resolution.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Fetch the chain a peer currently reports.
    async fn fetch_chain(&self, address: &str) -> Result<ChainResponse, PeerError>;
}

/// Fetches `GET http://{address}/chain`.
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpPeerClient {
    pub fn new(timeout: Duration) -> Result<Self, PeerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PeerError::Transport(format!("HTTP client error: {}", e)))?;
        Ok(Self { client, timeout })
    }

    pub fn chain_url(address: &str) -> String {
        format!("http://{}/chain", address)
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn fetch_chain(&self, address: &str) -> Result<ChainResponse, PeerError> {
        let response = self
            .client
            .get(Self::chain_url(address))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PeerError::Timeout {
                        address: address.to_string(),
                        after_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    PeerError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PeerError::Status {
                address: address.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<ChainResponse>()
            .await
            .map_err(|e| PeerError::Decode(e.to_string()))
    }
}
