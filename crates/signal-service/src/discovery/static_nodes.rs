//! In-memory node directory seeded from configuration.
//!
//! Node list format (`SIGNAL_STATIC_NODES`):
//!
//! ```text
//! media-relay:sfu-1=http://sfu-1:50051,directory:islb-1=http://islb:50051
//! ```

use super::{Capability, CapabilityCursors, DiscoveryError, Node, NodeDirectory};
use async_trait::async_trait;
use common::types::NodeId;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Static node directory.
///
/// The node set is fixed at construction; resource ownership is recorded
/// through [`NodeDirectory::bind`].
#[derive(Debug)]
pub struct StaticNodeDirectory {
    /// Nodes sorted by ID so round-robin order is stable.
    nodes: Vec<Node>,
    owners: RwLock<HashMap<String, NodeId>>,
    cursors: CapabilityCursors,
}

impl StaticNodeDirectory {
    pub fn new(mut nodes: Vec<Node>) -> Self {
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            nodes,
            owners: RwLock::new(HashMap::new()),
            cursors: CapabilityCursors::default(),
        }
    }

    /// Parse a `capability:node_id=endpoint` list separated by commas.
    pub fn parse_node_list(list: &str) -> Result<Vec<Node>, DiscoveryError> {
        list.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let (head, endpoint) = entry.split_once('=').ok_or_else(|| {
                    DiscoveryError::Backend(format!("node entry '{entry}' is missing '='"))
                })?;
                let (capability, node_id) = head.split_once(':').ok_or_else(|| {
                    DiscoveryError::Backend(format!("node entry '{entry}' is missing ':'"))
                })?;
                if node_id.is_empty() || endpoint.is_empty() {
                    return Err(DiscoveryError::Backend(format!(
                        "node entry '{entry}' has an empty id or endpoint"
                    )));
                }
                Ok(Node::new(node_id, capability.parse()?, endpoint))
            })
            .collect()
    }

    fn find(&self, node_id: &NodeId, capability: Capability) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| &n.id == node_id && n.capability == capability)
    }
}

#[async_trait]
impl NodeDirectory for StaticNodeDirectory {
    async fn resolve(
        &self,
        capability: Capability,
        resource_key: Option<&str>,
    ) -> Result<Node, DiscoveryError> {
        if let Some(key) = resource_key {
            let owner = self.owners.read().await.get(key).cloned();
            return match owner.as_ref().and_then(|id| self.find(id, capability)) {
                Some(node) => Ok(node.clone()),
                None => {
                    warn!(
                        target: "signal.discovery",
                        capability = %capability,
                        resource_key = %key,
                        owner = ?owner,
                        "Owner of resource is not discoverable"
                    );
                    Err(DiscoveryError::NotFound(capability))
                }
            };
        }

        let candidates: Vec<&Node> = self
            .nodes
            .iter()
            .filter(|n| n.capability == capability)
            .collect();

        self.cursors
            .for_capability(capability)
            .pick(&candidates)
            .map(|node| (*node).clone())
            .ok_or(DiscoveryError::NotFound(capability))
    }

    async fn bind(&self, resource_key: &str, node_id: &NodeId) -> Result<(), DiscoveryError> {
        debug!(
            target: "signal.discovery",
            resource_key = %resource_key,
            node_id = %node_id,
            "Recording resource owner"
        );
        self.owners
            .write()
            .await
            .insert(resource_key.to_string(), node_id.clone());
        Ok(())
    }

    async fn unbind(&self, resource_key: &str) -> Result<(), DiscoveryError> {
        self.owners.write().await.remove(resource_key);
        Ok(())
    }

    async fn nodes(&self) -> Result<Vec<Node>, DiscoveryError> {
        Ok(self.nodes.clone())
    }
}
