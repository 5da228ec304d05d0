//! Signaling router library.
//!
//! Sits between client signaling connections and the backend services of a
//! media cluster: relay nodes (terminate publish/subscribe media sessions)
//! and the directory service (room membership, stream ownership, fan-out).
//!
//! # Architecture
//!
//! ```text
//! transport ──> Dispatcher ──> SessionCoordinator ──┬─> PeerRegistry
//!                                                   ├─> NodeDirectory (discovery)
//!                                                   └─> RpcGateway ──> relay / directory
//!                                                          └─> StreamMonitor (per publish)
//! ```
//!
//! # Modules
//!
//! - [`config`] - Service configuration from environment
//! - [`discovery`] - Node resolution by capability and resource key
//! - [`dispatch`] - Action routing and caller-side policies
//! - [`errors`] - Error types with protocol error codes
//! - [`observability`] - Health endpoints and metrics
//! - [`protocol`] - Client action payloads
//! - [`registry`] - In-memory peer/room membership
//! - [`rpc`] - Remote call gateway and node clients
//! - [`session`] - The signaling actions and the publish lifecycle monitor

pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod errors;
pub mod observability;
pub mod protocol;
pub mod registry;
pub mod rpc;
pub mod session;
