//! Node discovery for relay nodes and the directory service.
//!
//! Resolves, for a capability and an optional resource key (a mid), the
//! node to call:
//!
//! - Unkeyed: any live node advertising the capability, round-robin
//! - Keyed: the node that owns the resource. An undiscoverable owner is
//!   `NotFound`, never a silent fallback to an arbitrary node
//!
//! # Backends
//!
//! - [`RedisNodeDirectory`] - shared cluster view in Redis
//! - [`StaticNodeDirectory`] - in-memory, seeded from configuration

pub mod redis;
pub mod static_nodes;

pub use self::redis::RedisNodeDirectory;
pub use static_nodes::StaticNodeDirectory;

use async_trait::async_trait;
use common::types::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Kind of service a node provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Terminates publish/subscribe media sessions.
    MediaRelay,
    /// Tracks room membership and stream ownership.
    Directory,
}

impl Capability {
    pub const ALL: [Capability; 2] = [Capability::MediaRelay, Capability::Directory];

    /// Wire and label form of the capability.
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::MediaRelay => "media-relay",
            Capability::Directory => "directory",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "media-relay" | "relay" | "sfu" => Ok(Capability::MediaRelay),
            "directory" | "islb" => Ok(Capability::Directory),
            other => Err(DiscoveryError::Backend(format!(
                "unknown capability '{other}'"
            ))),
        }
    }
}

/// A resolved backend node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Node identifier.
    pub id: NodeId,
    /// Capability the node advertises.
    pub capability: Capability,
    /// gRPC endpoint (e.g. `http://sfu-1:50051`).
    pub endpoint: String,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, capability: Capability, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capability,
            endpoint: endpoint.into(),
        }
    }
}

/// Discovery errors.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// No live node advertises the capability, or the resource owner
    /// cannot be determined.
    #[error("no node found for {0}")]
    NotFound(Capability),

    /// Discovery backend failed (connection, malformed record, ...).
    #[error("discovery backend error: {0}")]
    Backend(String),
}

/// Discovery backend seam.
#[async_trait]
pub trait NodeDirectory: Send + Sync {
    /// Resolve a node for `capability`, optionally the owner of `resource_key`.
    async fn resolve(
        &self,
        capability: Capability,
        resource_key: Option<&str>,
    ) -> Result<Node, DiscoveryError>;

    /// Record that `node_id` owns `resource_key`.
    async fn bind(&self, resource_key: &str, node_id: &NodeId) -> Result<(), DiscoveryError>;

    /// Drop the ownership record of `resource_key`.
    async fn unbind(&self, resource_key: &str) -> Result<(), DiscoveryError>;

    /// Every live node, across all capabilities.
    async fn nodes(&self) -> Result<Vec<Node>, DiscoveryError>;
}

/// Round-robin cursor over a candidate list.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl RoundRobin {
    /// Starting offset for the next walk over `len` candidates.
    pub fn next_start(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.next.fetch_add(1, Ordering::Relaxed) % len
    }

    /// Pick the next candidate.
    pub fn pick<'a, T>(&self, candidates: &'a [T]) -> Option<&'a T> {
        candidates.get(self.next_start(candidates.len()))
    }
}

/// One round-robin cursor per capability.
#[derive(Debug, Default)]
pub struct CapabilityCursors {
    relay: RoundRobin,
    directory: RoundRobin,
}

impl CapabilityCursors {
    pub fn for_capability(&self, capability: Capability) -> &RoundRobin {
        match capability {
            Capability::MediaRelay => &self.relay,
            Capability::Directory => &self.directory,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_parsing() {
        assert_eq!(
            "media-relay".parse::<Capability>().unwrap(),
            Capability::MediaRelay
        );
        assert_eq!("sfu".parse::<Capability>().unwrap(), Capability::MediaRelay);
        assert_eq!(
            "directory".parse::<Capability>().unwrap(),
            Capability::Directory
        );
        assert!("transcoder".parse::<Capability>().is_err());
    }

    #[test]
    fn test_round_robin_cycles_through_candidates() {
        let cursor = RoundRobin::default();
        let nodes = ["a", "b", "c"];

        let picked: Vec<_> = (0..6).map(|_| *cursor.pick(&nodes).unwrap()).collect();
        assert_eq!(picked, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn test_round_robin_empty() {
        let cursor = RoundRobin::default();
        let nodes: [&str; 0] = [];
        assert!(cursor.pick(&nodes).is_none());
        assert_eq!(cursor.next_start(0), 0);
    }

    #[test]
    fn test_cursors_are_independent_per_capability() {
        let cursors = CapabilityCursors::default();
        let nodes = ["a", "b"];

        assert_eq!(
            cursors.for_capability(Capability::MediaRelay).pick(&nodes),
            Some(&"a")
        );
        assert_eq!(
            cursors.for_capability(Capability::Directory).pick(&nodes),
            Some(&"a")
        );
        assert_eq!(
            cursors.for_capability(Capability::MediaRelay).pick(&nodes),
            Some(&"b")
        );
    }
}
