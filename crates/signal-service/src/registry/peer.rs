//! Signaling peers and the notifications pushed to them.

use common::types::{Mid, PeerId, RoomId};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// `stream-add` payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamAddNotice {
    pub rid: RoomId,
    pub uid: PeerId,
    pub mid: Mid,
    pub info: Value,
}

/// Server-initiated message to a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", content = "data", rename_all = "kebab-case")]
pub enum Notification {
    StreamAdd(StreamAddNotice),
}

/// One signaling connection.
///
/// The transport owns the `Arc<Peer>` and the notification receiver; the
/// registry only keeps a weak reference.
#[derive(Debug)]
pub struct Peer {
    id: PeerId,
    notifier: mpsc::UnboundedSender<Notification>,
}

impl Peer {
    /// Create a peer and the receiver its notifications arrive on.
    pub fn new(id: impl Into<PeerId>) -> (Arc<Self>, mpsc::UnboundedReceiver<Notification>) {
        let (notifier, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                id: id.into(),
                notifier,
            }),
            rx,
        )
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Push a notification. Returns `false` if the client side is gone.
    pub fn notify(&self, notification: Notification) -> bool {
        match self.notifier.send(notification) {
            Ok(()) => true,
            Err(_) => {
                debug!(
                    target: "signal.registry",
                    peer_id = %self.id,
                    "Dropping notification for disconnected peer"
                );
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notice() -> Notification {
        Notification::StreamAdd(StreamAddNotice {
            rid: RoomId::from("r1"),
            uid: PeerId::from("alice"),
            mid: Mid::from("m1"),
            info: json!({"name": "cam"}),
        })
    }

    #[test]
    fn test_notification_wire_shape() {
        let value = serde_json::to_value(notice()).unwrap();
        assert_eq!(
            value,
            json!({
                "method": "stream-add",
                "data": {"rid": "r1", "uid": "alice", "mid": "m1", "info": {"name": "cam"}}
            })
        );
    }

    #[tokio::test]
    async fn test_notify_delivers_to_receiver() {
        let (peer, mut rx) = Peer::new("alice");

        assert!(peer.notify(notice()));
        assert_eq!(rx.recv().await.unwrap(), notice());
    }

    #[test]
    fn test_notify_after_receiver_dropped() {
        let (peer, rx) = Peer::new("alice");
        drop(rx);

        assert!(!peer.notify(notice()));
    }
}
