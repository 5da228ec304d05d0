//! Redis-backed node directory.
//!
//! # Key Patterns
//!
//! - `nodes:{capability}` - SET of node IDs advertising the capability
//! - `node:{node_id}` - HASH `{capability, endpoint}`, expires when the node
//!   stops refreshing it
//! - `stream:{mid}:node` - ID of the relay node owning the stream
//!
//! A node ID present in `nodes:{capability}` whose `node:{node_id}` hash has
//! expired is treated as dead and skipped.
//!
//! # Connection Pattern
//!
//! `MultiplexedConnection` is cheap to clone and safe for concurrent use, so
//! each operation clones it instead of locking.

use super::{Capability, CapabilityCursors, DiscoveryError, Node, NodeDirectory};
use async_trait::async_trait;
use common::types::NodeId;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use tracing::{debug, error, instrument, warn};

fn capability_key(capability: Capability) -> String {
    format!("nodes:{capability}")
}

fn node_key(node_id: &str) -> String {
    format!("node:{node_id}")
}

fn owner_key(resource_key: &str) -> String {
    format!("stream:{resource_key}:node")
}

/// Build a [`Node`] from its `node:{id}` hash, or `None` if the hash is
/// missing (expired) or advertises a different capability.
fn node_from_hash(
    node_id: &str,
    capability: Capability,
    fields: &HashMap<String, String>,
) -> Option<Node> {
    let endpoint = fields.get("endpoint").filter(|e| !e.is_empty())?;
    let advertised: Capability = fields.get("capability")?.parse().ok()?;
    (advertised == capability).then(|| Node::new(node_id, capability, endpoint.as_str()))
}

/// Node directory backed by the shared Redis cluster view.
///
/// Cheaply cloneable apart from the round-robin cursors, which are per
/// instance.
pub struct RedisNodeDirectory {
    connection: MultiplexedConnection,
    cursors: CapabilityCursors,
}

impl RedisNodeDirectory {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::Backend` if the client cannot be opened or
    /// the connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self, DiscoveryError> {
        let client = Client::open(redis_url).map_err(|e| {
            // redis_url may contain credentials, never log it
            error!(target: "signal.discovery", error = %e, "Failed to open Redis client");
            DiscoveryError::Backend(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "signal.discovery", error = %e, "Failed to connect to Redis");
                DiscoveryError::Backend(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self {
            connection,
            cursors: CapabilityCursors::default(),
        })
    }

    async fn load_node(
        &self,
        node_id: &str,
        capability: Capability,
    ) -> Result<Option<Node>, DiscoveryError> {
        let mut conn = self.connection.clone();
        let fields: HashMap<String, String> =
            conn.hgetall(node_key(node_id)).await.map_err(|e| {
                warn!(
                    target: "signal.discovery",
                    error = %e,
                    node_id = %node_id,
                    "Failed to read node record"
                );
                DiscoveryError::Backend(format!("Failed to read node record: {e}"))
            })?;

        Ok(node_from_hash(node_id, capability, &fields))
    }

    async fn live_nodes(&self, capability: Capability) -> Result<Vec<Node>, DiscoveryError> {
        let mut conn = self.connection.clone();
        let mut ids: Vec<String> = conn
            .smembers(capability_key(capability))
            .await
            .map_err(|e| {
                warn!(
                    target: "signal.discovery",
                    error = %e,
                    capability = %capability,
                    "Failed to list nodes"
                );
                DiscoveryError::Backend(format!("Failed to list nodes: {e}"))
            })?;
        ids.sort();

        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            match self.load_node(&id, capability).await? {
                Some(node) => nodes.push(node),
                None => debug!(
                    target: "signal.discovery",
                    node_id = %id,
                    capability = %capability,
                    "Skipping node without a live record"
                ),
            }
        }
        Ok(nodes)
    }
}

#[async_trait]
impl NodeDirectory for RedisNodeDirectory {
    #[instrument(skip_all, fields(capability = %capability, resource_key = ?resource_key))]
    async fn resolve(
        &self,
        capability: Capability,
        resource_key: Option<&str>,
    ) -> Result<Node, DiscoveryError> {
        if let Some(key) = resource_key {
            let mut conn = self.connection.clone();
            let owner: Option<String> = conn.get(owner_key(key)).await.map_err(|e| {
                warn!(target: "signal.discovery", error = %e, "Failed to read stream owner");
                DiscoveryError::Backend(format!("Failed to read stream owner: {e}"))
            })?;

            let Some(owner) = owner else {
                warn!(
                    target: "signal.discovery",
                    resource_key = %key,
                    "No owner recorded for resource"
                );
                return Err(DiscoveryError::NotFound(capability));
            };

            return self
                .load_node(&owner, capability)
                .await?
                .ok_or_else(|| {
                    warn!(
                        target: "signal.discovery",
                        resource_key = %key,
                        owner = %owner,
                        "Owner of resource is no longer live"
                    );
                    DiscoveryError::NotFound(capability)
                });
        }

        let nodes = self.live_nodes(capability).await?;
        self.cursors
            .for_capability(capability)
            .pick(&nodes)
            .cloned()
            .ok_or(DiscoveryError::NotFound(capability))
    }

    async fn bind(&self, resource_key: &str, node_id: &NodeId) -> Result<(), DiscoveryError> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .set(owner_key(resource_key), node_id.as_str())
            .await
            .map_err(|e| {
                warn!(
                    target: "signal.discovery",
                    error = %e,
                    resource_key = %resource_key,
                    "Failed to record stream owner"
                );
                DiscoveryError::Backend(format!("Failed to record stream owner: {e}"))
            })?;

        debug!(
            target: "signal.discovery",
            resource_key = %resource_key,
            node_id = %node_id,
            "Recorded stream owner"
        );
        Ok(())
    }

    async fn unbind(&self, resource_key: &str) -> Result<(), DiscoveryError> {
        let mut conn = self.connection.clone();
        let _: () = conn.del(owner_key(resource_key)).await.map_err(|e| {
            warn!(
                target: "signal.discovery",
                error = %e,
                resource_key = %resource_key,
                "Failed to clear stream owner"
            );
            DiscoveryError::Backend(format!("Failed to clear stream owner: {e}"))
        })?;
        Ok(())
    }

    async fn nodes(&self) -> Result<Vec<Node>, DiscoveryError> {
        let mut nodes = Vec::new();
        for capability in Capability::ALL {
            nodes.extend(self.live_nodes(capability).await?);
        }
        Ok(nodes)
    }
}
