//! Pre-wired test fixtures.
//!
//! [`TestCluster`] assembles a real [`SessionCoordinator`] and
//! [`Dispatcher`] over a static node list whose nodes are served by mocks.
//! [`TestPeer`] wraps a registry peer together with its notification
//! receiver.

use crate::mock_connector::MockConnector;
use crate::mock_directory::MockDirectory;
use crate::mock_relay::MockRelay;
use common::types::PeerId;
use signal_service::discovery::{Capability, Node, NodeDirectory, StaticNodeDirectory};
use signal_service::dispatch::Dispatcher;
use signal_service::registry::{Notification, Peer, PeerRegistry};
use signal_service::rpc::{RpcGateway, SessionDescription};
use signal_service::session::SessionCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Node ID of the directory service in a [`TestCluster`].
pub const DIRECTORY_NODE_ID: &str = "islb-1";

/// Relay call deadline used unless overridden.
pub const DEFAULT_TEST_RELAY_TIMEOUT: Duration = Duration::from_millis(500);

/// How long notification helpers wait before failing the test.
pub const NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(2);

/// A client offer with a non-empty SDP body.
pub fn sdp_offer() -> SessionDescription {
    SessionDescription::offer("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\n")
}

/// A connected peer and its notification channel.
pub struct TestPeer {
    pub peer: Arc<Peer>,
    notifications: mpsc::UnboundedReceiver<Notification>,
}

impl TestPeer {
    pub fn new(id: &str) -> Self {
        let (peer, notifications) = Peer::new(id);
        Self {
            peer,
            notifications,
        }
    }

    pub fn id(&self) -> &PeerId {
        self.peer.id()
    }

    /// Next pushed notification; panics after [`NOTIFICATION_TIMEOUT`].
    pub async fn next_notification(&mut self) -> Notification {
        tokio::time::timeout(NOTIFICATION_TIMEOUT, self.notifications.recv())
            .await
            .expect("timed out waiting for a notification")
            .expect("notification channel closed")
    }

    /// Assert nothing arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(Some(notification)) =
            tokio::time::timeout(window, self.notifications.recv()).await
        {
            panic!("unexpected notification: {notification:?}");
        }
    }
}

/// Router wired to mock relays and a mock directory.
pub struct TestCluster {
    pub relays: Vec<MockRelay>,
    pub directory: MockDirectory,
    pub connector: MockConnector,
    pub nodes: Arc<StaticNodeDirectory>,
    pub registry: Arc<PeerRegistry>,
    pub coordinator: Arc<SessionCoordinator>,
    pub dispatcher: Dispatcher,
}

impl TestCluster {
    /// Cluster with one relay per ID and a healthy directory.
    pub fn with_relays(relay_ids: &[&str]) -> Self {
        relay_ids
            .iter()
            .fold(Self::builder(), |builder, id| builder.relay(MockRelay::new(*id)))
            .build()
    }

    #[must_use]
    pub fn builder() -> TestClusterBuilder {
        TestClusterBuilder::default()
    }

    /// The relay mock serving `node_id`.
    pub fn relay(&self, node_id: &str) -> &MockRelay {
        self.relays
            .iter()
            .find(|relay| relay.node_id() == node_id)
            .unwrap_or_else(|| panic!("no relay {node_id} in cluster"))
    }
}

/// Builder for [`TestCluster`].
pub struct TestClusterBuilder {
    relays: Vec<MockRelay>,
    directory: Option<MockDirectory>,
    relay_timeout: Duration,
}

impl Default for TestClusterBuilder {
    fn default() -> Self {
        Self {
            relays: Vec::new(),
            directory: Some(MockDirectory::new()),
            relay_timeout: DEFAULT_TEST_RELAY_TIMEOUT,
        }
    }
}

impl TestClusterBuilder {
    #[must_use]
    pub fn relay(mut self, relay: MockRelay) -> Self {
        self.relays.push(relay);
        self
    }

    #[must_use]
    pub fn directory(mut self, directory: MockDirectory) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Leave the directory capability unregistered.
    #[must_use]
    pub fn without_directory(mut self) -> Self {
        self.directory = None;
        self
    }

    #[must_use]
    pub fn relay_timeout(mut self, timeout: Duration) -> Self {
        self.relay_timeout = timeout;
        self
    }

    pub fn build(self) -> TestCluster {
        let mut node_list: Vec<Node> = self
            .relays
            .iter()
            .map(|relay| {
                Node::new(
                    relay.node_id(),
                    Capability::MediaRelay,
                    format!("http://{}:50051", relay.node_id()),
                )
            })
            .collect();

        let mut connector = MockConnector::new();
        for relay in &self.relays {
            connector = connector.with_relay(relay.clone());
        }

        let directory = match self.directory {
            Some(directory) => {
                node_list.push(Node::new(
                    DIRECTORY_NODE_ID,
                    Capability::Directory,
                    format!("http://{DIRECTORY_NODE_ID}:50051"),
                ));
                connector = connector.with_directory(DIRECTORY_NODE_ID, directory.clone());
                directory
            }
            None => MockDirectory::new(),
        };

        let nodes = Arc::new(StaticNodeDirectory::new(node_list));
        let registry = Arc::new(PeerRegistry::new());
        let gateway = RpcGateway::new(Arc::new(connector.clone()), self.relay_timeout);
        let coordinator = Arc::new(SessionCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&nodes) as Arc<dyn NodeDirectory>,
            gateway,
        ));
        let dispatcher = Dispatcher::new(Arc::clone(&coordinator));

        TestCluster {
            relays: self.relays,
            directory,
            connector,
            nodes,
            registry,
            coordinator,
            dispatcher,
        }
    }
}
