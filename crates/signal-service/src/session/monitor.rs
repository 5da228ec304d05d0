//! Publish stream lifecycle monitor.
//!
//! One task per successful publish. It blocks on the next event of the
//! publish stream; any event after the answer (another message, a close, or
//! a failure) means the publishing session ended. The monitor then drops the
//! stream's ownership record, tells the directory service the stream is
//! gone, and exits. There is no other way to stop it.

use crate::discovery::NodeDirectory;
use crate::observability::metrics;
use crate::rpc::{DirectoryClient, Method, PublishStream, RpcGateway, StreamEvent, StreamRemoval};
use common::types::{Mid, NodeId, PeerId, RoomId};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Identity of the monitored stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredStream {
    pub rid: RoomId,
    pub uid: PeerId,
    pub nid: NodeId,
    pub mid: Mid,
}

pub struct StreamMonitor {
    gateway: RpcGateway,
    nodes: Arc<dyn NodeDirectory>,
    directory: Arc<dyn DirectoryClient>,
}

impl StreamMonitor {
    pub fn new(
        gateway: RpcGateway,
        nodes: Arc<dyn NodeDirectory>,
        directory: Arc<dyn DirectoryClient>,
    ) -> Self {
        Self {
            gateway,
            nodes,
            directory,
        }
    }

    /// Watch `stream` on a dedicated task until the relay ends it.
    pub fn spawn(self, mut stream: PublishStream, target: MonitoredStream) -> JoinHandle<()> {
        metrics::publish_stream_opened();
        tokio::spawn(async move {
            let reason = match stream.recv().await {
                StreamEvent::Message(_) => "message",
                StreamEvent::Closed => "closed",
                StreamEvent::Failed(err) => {
                    warn!(
                        target: "signal.monitor",
                        mid = %target.mid,
                        code = err.code,
                        error = %err.message,
                        "Publish stream failed"
                    );
                    "failed"
                }
            };
            drop(stream);
            metrics::publish_stream_closed(reason);

            info!(
                target: "signal.monitor",
                room_id = %target.rid,
                peer_id = %target.uid,
                node_id = %target.nid,
                mid = %target.mid,
                reason,
                "Publish closed"
            );

            if let Err(e) = self.nodes.unbind(target.mid.as_str()).await {
                warn!(
                    target: "signal.monitor",
                    mid = %target.mid,
                    error = %e,
                    "Failed to clear stream owner"
                );
            }

            let directory = self.directory;
            let removal = StreamRemoval {
                rid: target.rid,
                uid: target.uid,
                nid: Some(target.nid),
                mid: Some(target.mid),
            };
            self.gateway
                .call_async(Method::StreamRemove, async move {
                    directory.stream_remove(removal).await
                });
        })
    }
}
