//! Observability for the signaling router.
//!
//! All instrumentation uses `#[instrument(skip_all)]` with explicit fields;
//! SDP bodies and opaque client blobs are never logged.
//!
//! # Metrics
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `signal_actions_total` | Counter | `action`, `status` |
//! | `signal_action_duration_seconds` | Histogram | `action` |
//! | `signal_rpc_calls_total` | Counter | `method`, `mode`, `status` |
//! | `signal_rpc_duration_seconds` | Histogram | `method`, `mode` |
//! | `signal_rooms_active` | Gauge | none |
//! | `signal_peers_active` | Gauge | none |
//! | `signal_publish_streams_active` | Gauge | none |
//! | `signal_publish_streams_closed_total` | Counter | `reason` |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};

use crate::registry::PeerRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Refresh the room and peer gauges from the registry every `period` until
/// `cancel` fires.
pub fn spawn_registry_gauges(
    registry: Arc<PeerRegistry>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(target: "signal.registry", "Gauge refresher stopped");
                    break;
                }
                _ = ticker.tick() => {
                    metrics::set_rooms_active(registry.room_count().await);
                    metrics::set_peers_active(registry.peer_count().await);
                }
            }
        }
    })
}
