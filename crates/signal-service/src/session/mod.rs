//! Signaling session handling.

pub mod coordinator;
pub mod monitor;

pub use coordinator::SessionCoordinator;
pub use monitor::{MonitoredStream, StreamMonitor};
