//! # Signal Test Utilities
//!
//! Shared test utilities for the signaling router.
//!
//! This crate provides mock backend nodes and fixtures for testing the
//! router without real relays, a directory service, or Redis.
//!
//! ## Modules
//!
//! - `mock_relay` - Scripted relay node with controllable publish streams
//! - `mock_directory` - In-memory directory service that records every call
//! - `mock_connector` - Hands the mocks out per node ID
//! - `fixtures` - `TestCluster` and `TestPeer`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use signal_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let cluster = TestCluster::with_relays(&["sfu-1"]);
//!     let mut alice = TestPeer::new("alice");
//!
//!     cluster
//!         .dispatcher
//!         .handle(&alice.peer, "join", serde_json::json!({ "rid": "room-1" }))
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod fixtures;
pub mod mock_connector;
pub mod mock_directory;
pub mod mock_relay;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_connector::MockConnector;
pub use mock_directory::{DirectoryCall, MockDirectory};
pub use mock_relay::MockRelay;
