//! Mock node connector.
//!
//! Maps node IDs to mock clients and records which node each client was
//! handed out for, so tests can assert where a call was routed.

use async_trait::async_trait;
use common::types::NodeId;
use signal_service::discovery::Node;
use signal_service::rpc::{DirectoryClient, NodeConnector, RelayClient, RpcError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::mock_directory::MockDirectory;
use crate::mock_relay::MockRelay;

/// gRPC `UNAVAILABLE`.
const CODE_UNAVAILABLE: i32 = 14;

#[derive(Debug, Default)]
struct MockConnectorInner {
    relays: HashMap<NodeId, MockRelay>,
    directories: HashMap<NodeId, MockDirectory>,
    connections: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    inner: Arc<Mutex<MockConnectorInner>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `relay` for node `relay.node_id()`.
    #[must_use]
    pub fn with_relay(self, relay: MockRelay) -> Self {
        let id = NodeId::from(relay.node_id());
        self.inner.lock().unwrap().relays.insert(id, relay);
        self
    }

    #[must_use]
    pub fn with_directory(self, node_id: impl Into<NodeId>, directory: MockDirectory) -> Self {
        self.inner
            .lock()
            .unwrap()
            .directories
            .insert(node_id.into(), directory);
        self
    }

    /// Node IDs clients were handed out for, in order.
    pub fn connections(&self) -> Vec<NodeId> {
        self.inner.lock().unwrap().connections.clone()
    }
}

#[async_trait]
impl NodeConnector for MockConnector {
    async fn relay(&self, node: &Node) -> Result<Arc<dyn RelayClient>, RpcError> {
        let mut inner = self.inner.lock().unwrap();
        let relay = inner.relays.get(&node.id).cloned().ok_or_else(|| {
            RpcError::new(CODE_UNAVAILABLE, format!("no relay at {}", node.endpoint))
        })?;
        inner.connections.push(node.id.clone());
        Ok(Arc::new(relay))
    }

    async fn directory(&self, node: &Node) -> Result<Arc<dyn DirectoryClient>, RpcError> {
        let mut inner = self.inner.lock().unwrap();
        let directory = inner.directories.get(&node.id).cloned().ok_or_else(|| {
            RpcError::new(CODE_UNAVAILABLE, format!("no directory at {}", node.endpoint))
        })?;
        inner.connections.push(node.id.clone());
        Ok(Arc::new(directory))
    }
}
