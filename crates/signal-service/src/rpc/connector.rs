//! Client construction for resolved nodes.
//!
//! [`GrpcConnector`] caches one tonic `Channel` per endpoint so repeated
//! calls to the same node reuse its HTTP/2 connection.
//! [`spawn_channel_pruner`] drops channels of nodes that have left
//! discovery.

use super::directory::{DirectoryClient, GrpcDirectoryClient};
use super::relay::{GrpcRelayClient, RelayClient};
use super::RpcError;
use crate::discovery::{Node, NodeDirectory};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, error, info, warn};

/// gRPC `INVALID_ARGUMENT`, reported for unparseable endpoints.
const CODE_INVALID_ARGUMENT: i32 = 3;

/// Hands out clients for resolved nodes.
#[async_trait]
pub trait NodeConnector: Send + Sync {
    async fn relay(&self, node: &Node) -> Result<Arc<dyn RelayClient>, RpcError>;

    async fn directory(&self, node: &Node) -> Result<Arc<dyn DirectoryClient>, RpcError>;
}

/// Connector with a per-endpoint channel cache.
///
/// Channels connect lazily; a node that is down surfaces as an error on the
/// first call rather than here. Request deadlines are applied by the
/// gateway, not by the channel.
pub struct GrpcConnector {
    channels: RwLock<HashMap<String, Channel>>,
    connect_timeout: Duration,
}

impl GrpcConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            connect_timeout,
        }
    }

    /// Get or create the channel for an endpoint.
    async fn channel(&self, endpoint: &str) -> Result<Channel, RpcError> {
        {
            let channels = self.channels.read().await;
            if let Some(channel) = channels.get(endpoint) {
                return Ok(channel.clone());
            }
        }

        let channel = Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| {
                error!(target: "signal.rpc", error = %e, endpoint = %endpoint, "Invalid node endpoint");
                RpcError::new(CODE_INVALID_ARGUMENT, "invalid node endpoint")
            })?
            .connect_timeout(self.connect_timeout)
            .connect_lazy();

        let mut channels = self.channels.write().await;
        let channel = channels
            .entry(endpoint.to_string())
            .or_insert(channel)
            .clone();

        debug!(target: "signal.rpc", endpoint = %endpoint, "Cached channel for node");
        Ok(channel)
    }

    /// Number of cached channels.
    pub async fn cached_channels(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Drop every cached channel whose endpoint is not in `live`.
    ///
    /// Returns the number of channels dropped.
    pub async fn retain_endpoints(&self, live: &HashSet<String>) -> usize {
        let mut channels = self.channels.write().await;
        let before = channels.len();
        channels.retain(|endpoint, _| live.contains(endpoint));
        before - channels.len()
    }
}

/// Every `period`, drop cached channels of nodes that no longer resolve,
/// until `cancel` fires.
///
/// A failed node listing skips the pass; channels are only dropped on a
/// successful listing.
pub fn spawn_channel_pruner(
    connector: Arc<GrpcConnector>,
    nodes: Arc<dyn NodeDirectory>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(target: "signal.rpc", "Channel pruner stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let live = match nodes.nodes().await {
                        Ok(live) => live,
                        Err(e) => {
                            warn!(target: "signal.rpc", error = %e, "Node listing failed, skipping channel prune");
                            continue;
                        }
                    };
                    let endpoints: HashSet<String> =
                        live.into_iter().map(|node| node.endpoint).collect();
                    let dropped = connector.retain_endpoints(&endpoints).await;
                    if dropped > 0 {
                        info!(target: "signal.rpc", dropped, "Dropped channels of departed nodes");
                    }
                }
            }
        }
    })
}

#[async_trait]
impl NodeConnector for GrpcConnector {
    async fn relay(&self, node: &Node) -> Result<Arc<dyn RelayClient>, RpcError> {
        let channel = self.channel(&node.endpoint).await?;
        Ok(Arc::new(GrpcRelayClient::new(channel)))
    }

    async fn directory(&self, node: &Node) -> Result<Arc<dyn DirectoryClient>, RpcError> {
        let channel = self.channel(&node.endpoint).await?;
        Ok(Arc::new(GrpcDirectoryClient::new(channel)))
    }
}
