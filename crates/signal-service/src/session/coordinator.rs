//! Session coordinator: the seven signaling actions.
//!
//! Each action is stateless apart from its effect on the [`PeerRegistry`].
//! Steps inside an action run in a fixed order:
//!
//! - Validation and node resolution happen before any side effect, except
//!   for join, which records membership before resolving the directory, and
//!   unpublish, which resolves the directory only for its notification
//! - Best-effort directory calls (on-join, on-leave) are logged, never
//!   surfaced
//! - Fire-and-forget notifications never fail the action

use super::monitor::{MonitoredStream, StreamMonitor};
use crate::discovery::{Capability, Node, NodeDirectory};
use crate::errors::SignalError;
use crate::protocol::{
    BroadcastParams, JoinParams, LeaveParams, PublishParams, PublishResult, SubscribeParams,
    TrickleParams, UnpublishParams, UnsubscribeParams,
};
use crate::registry::{Notification, Peer, PeerRegistry, StreamAddNotice};
use crate::rpc::{
    DirectoryClient, Method, PublishRequest, PublishedStream, RelayClient, RpcError, RpcGateway,
    StreamEvent, StreamRemoval, SubscribeAnswer, UnsubscribeResult, CODE_UNKNOWN,
};
use common::types::Mid;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, instrument, warn};

/// Push `stream-add` for every published stream to a newly joined peer.
fn deliver_existing_streams(peer: &Weak<Peer>, streams: Vec<PublishedStream>) {
    let Some(peer) = peer.upgrade() else {
        return;
    };
    for stream in streams {
        if stream.mid.is_empty() {
            continue;
        }
        peer.notify(Notification::StreamAdd(StreamAddNotice {
            rid: stream.rid,
            uid: stream.uid,
            mid: stream.mid,
            info: stream.info,
        }));
    }
}

/// Coordinates client actions across the registry, discovery, and remote
/// nodes.
pub struct SessionCoordinator {
    registry: Arc<PeerRegistry>,
    nodes: Arc<dyn NodeDirectory>,
    gateway: RpcGateway,
}

impl SessionCoordinator {
    pub fn new(
        registry: Arc<PeerRegistry>,
        nodes: Arc<dyn NodeDirectory>,
        gateway: RpcGateway,
    ) -> Self {
        Self {
            registry,
            nodes,
            gateway,
        }
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    async fn resolve(
        &self,
        capability: Capability,
        resource_key: Option<&Mid>,
    ) -> Result<Node, SignalError> {
        self.nodes
            .resolve(capability, resource_key.map(Mid::as_str))
            .await
            .map_err(|e| {
                warn!(
                    target: "signal.session",
                    capability = %capability,
                    resource_key = ?resource_key,
                    error = %e,
                    "Node not found, reject"
                );
                SignalError::ServiceUnavailable(capability)
            })
    }

    async fn directory(&self) -> Result<Arc<dyn DirectoryClient>, SignalError> {
        let node = self.resolve(Capability::Directory, None).await?;
        self.gateway.directory(&node).await
    }

    async fn relay(&self, mid: Option<&Mid>) -> Result<(Node, Arc<dyn RelayClient>), SignalError> {
        let node = self.resolve(Capability::MediaRelay, mid).await?;
        let client = self.gateway.relay(&node).await?;
        Ok((node, client))
    }

    /// Fire-and-forget `stream-remove`.
    fn notify_stream_removed(&self, directory: &Arc<dyn DirectoryClient>, removal: StreamRemoval) {
        let directory = Arc::clone(directory);
        self.gateway.call_async(Method::StreamRemove, async move {
            directory.stream_remove(removal).await
        });
    }

    /// Join a room.
    ///
    /// Idempotent: a peer already in the room returns immediately without
    /// any remote call.
    #[instrument(skip_all, fields(peer_id = %peer.id(), room_id = %params.rid))]
    pub async fn join(&self, peer: &Arc<Peer>, params: JoinParams) -> Result<(), SignalError> {
        let JoinParams { rid, info } = params;
        if rid.is_empty() {
            return Err(SignalError::Room);
        }

        if !self.registry.add_peer(&rid, peer).await.inserted() {
            debug!(target: "signal.session", "Peer already in room");
            return Ok(());
        }

        let directory = self.directory().await?;

        // Blocks until the directory has recorded the join so the catch-up
        // below sees a consistent room.
        if let Err(err) = self
            .gateway
            .call_sync(Method::OnJoin, None, directory.on_join(&rid, peer.id(), &info))
            .await
        {
            error!(
                target: "signal.session",
                code = err.code,
                error = %err.message,
                "Directory on-join failed"
            );
        }

        let target = Arc::downgrade(peer);
        let room = rid.clone();
        self.gateway
            .call_async(Method::GetPubs, async move { directory.get_pubs(&room).await })
            .then(
                move |streams| deliver_existing_streams(&target, streams),
                |_| {},
            );

        info!(target: "signal.session", "Peer joined room");
        Ok(())
    }

    /// Leave a room. Membership is cleared once the directory resolves,
    /// whatever the on-leave call returns.
    #[instrument(skip_all, fields(peer_id = %peer.id(), room_id = %params.rid))]
    pub async fn leave(&self, peer: &Peer, params: LeaveParams) -> Result<(), SignalError> {
        let LeaveParams { rid } = params;
        if rid.is_empty() {
            return Err(SignalError::Room);
        }

        let directory = self.directory().await?;

        self.notify_stream_removed(
            &directory,
            StreamRemoval {
                rid: rid.clone(),
                uid: peer.id().clone(),
                nid: None,
                mid: None,
            },
        );

        if let Err(err) = self
            .gateway
            .call_sync(
                Method::OnLeave,
                Some(self.gateway.relay_timeout()),
                directory.on_leave(&rid, peer.id()),
            )
            .await
        {
            error!(
                target: "signal.session",
                code = err.code,
                error = %err.message,
                "Directory on-leave failed"
            );
        }

        self.registry.del_peer(&rid, peer.id()).await;
        info!(target: "signal.session", "Peer left room");
        Ok(())
    }

    /// Publish a stream on a relay node and start watching it.
    #[instrument(skip_all, fields(peer_id = %peer.id()))]
    pub async fn publish(
        &self,
        peer: &Peer,
        params: PublishParams,
    ) -> Result<PublishResult, SignalError> {
        let relay_node = self.resolve(Capability::MediaRelay, None).await?;

        let Some(rid) = self.registry.get_room_by_peer(peer.id()).await else {
            return Err(SignalError::Room);
        };

        // Resolved before the stream opens so a missing directory cannot
        // leave an unmonitored publish behind.
        let directory = self.directory().await?;
        let relay = self.gateway.relay(&relay_node).await?;

        let request = PublishRequest {
            rid: rid.clone(),
            offer: params.jsep,
            options: params.options,
        };
        let mut stream = self.gateway.open_publish(relay.as_ref(), request).await?;

        let first = match stream.recv().await {
            StreamEvent::Message(answer) => answer,
            StreamEvent::Failed(err) => {
                warn!(target: "signal.session", error = %err, "Publish rejected by relay");
                return Err(err.into());
            }
            StreamEvent::Closed => {
                warn!(target: "signal.session", "Publish stream closed before answer");
                return Err(RpcError::new(CODE_UNKNOWN, "publish stream closed before answer").into());
            }
        };
        if first.mid.is_empty() {
            warn!(target: "signal.session", "Relay answered publish without a mid");
            return Err(RpcError::new(CODE_UNKNOWN, "relay assigned no mid").into());
        }

        let mid = first.mid.clone();
        if let Err(e) = self.nodes.bind(mid.as_str(), &relay_node.id).await {
            warn!(
                target: "signal.session",
                mid = %mid,
                error = %e,
                "Failed to record stream owner"
            );
        }

        let added = PublishedStream {
            rid: rid.clone(),
            uid: peer.id().clone(),
            mid: mid.clone(),
            nid: relay_node.id.clone(),
            info: first.stream_info,
        };
        let notifier = Arc::clone(&directory);
        self.gateway.call_async(Method::StreamAdd, async move {
            notifier.stream_add(added).await
        });

        StreamMonitor::new(self.gateway.clone(), Arc::clone(&self.nodes), directory).spawn(
            stream,
            MonitoredStream {
                rid,
                uid: peer.id().clone(),
                nid: relay_node.id.clone(),
                mid: mid.clone(),
            },
        );

        info!(
            target: "signal.session",
            mid = %mid,
            node_id = %relay_node.id,
            "Stream published"
        );
        Ok(PublishResult {
            mid,
            jsep: first.answer,
        })
    }

    /// Stop a published stream on its owning relay node.
    #[instrument(skip_all, fields(peer_id = %peer.id(), mid = %params.mid))]
    pub async fn unpublish(&self, peer: &Peer, params: UnpublishParams) -> Result<(), SignalError> {
        let UnpublishParams { rid, mid } = params;
        if mid.is_empty() {
            return Err(SignalError::Mid);
        }

        let (relay_node, relay) = self.relay(Some(&mid)).await?;

        self.gateway
            .call_sync(
                Method::Unpublish,
                Some(self.gateway.relay_timeout()),
                relay.unpublish(&mid),
            )
            .await?;

        let rid = if rid.is_empty() {
            self.registry
                .get_room_by_peer(peer.id())
                .await
                .unwrap_or(rid)
        } else {
            rid
        };

        // The relay has already dropped the stream; a missing directory
        // only loses the notification.
        match self.directory().await {
            Ok(directory) => self.notify_stream_removed(
                &directory,
                StreamRemoval {
                    rid,
                    uid: peer.id().clone(),
                    nid: Some(relay_node.id),
                    mid: Some(mid),
                },
            ),
            Err(err) => warn!(
                target: "signal.session",
                error = %err,
                "Stream unpublished, directory not notified"
            ),
        }
        Ok(())
    }

    /// Subscribe to a stream on its owning relay node.
    #[instrument(skip_all, fields(peer_id = %peer.id(), mid = %params.mid))]
    pub async fn subscribe(
        &self,
        peer: &Peer,
        params: SubscribeParams,
    ) -> Result<SubscribeAnswer, SignalError> {
        let SubscribeParams { mid, jsep } = params;
        if mid.is_empty() {
            return Err(SignalError::Mid);
        }
        if jsep.is_empty() {
            return Err(SignalError::Jsep);
        }

        // Keyed resolution only ever yields the recorded owner, so a
        // subscribe never lands on a relay that would need to bridge.
        let (relay_node, relay) = self.relay(Some(&mid)).await?;
        debug!(target: "signal.session", node_id = %relay_node.id, "Subscribing on owner");

        let answer = self
            .gateway
            .call_sync(
                Method::Subscribe,
                Some(self.gateway.relay_timeout()),
                relay.subscribe(&mid, jsep),
            )
            .await?;
        Ok(answer)
    }

    #[instrument(skip_all, fields(peer_id = %peer.id(), mid = %params.mid))]
    pub async fn unsubscribe(
        &self,
        peer: &Peer,
        params: UnsubscribeParams,
    ) -> Result<UnsubscribeResult, SignalError> {
        let UnsubscribeParams { mid } = params;
        if mid.is_empty() {
            return Err(SignalError::Mid);
        }

        let (_, relay) = self.relay(Some(&mid)).await?;
        let result = self
            .gateway
            .call_sync(
                Method::Unsubscribe,
                Some(self.gateway.relay_timeout()),
                relay.unsubscribe(&mid),
            )
            .await?;
        Ok(result)
    }

    /// Relay an application message to a room through the directory.
    #[instrument(skip_all, fields(peer_id = %peer.id(), room_id = %params.rid))]
    pub async fn broadcast(&self, peer: &Peer, params: BroadcastParams) -> Result<(), SignalError> {
        let BroadcastParams { rid, uid, info } = params;
        if rid.is_empty() || uid.is_empty() {
            return Err(SignalError::Room);
        }

        let directory = self.directory().await?;
        self.gateway.call_async(Method::Broadcast, async move {
            directory.broadcast(&rid, &uid, &info).await
        });
        Ok(())
    }

    /// ICE candidate exchange is disabled: always succeeds, contacts nothing.
    pub async fn trickle(&self, peer: &Peer, params: TrickleParams) -> Result<(), SignalError> {
        debug!(
            target: "signal.session",
            peer_id = %peer.id(),
            mid = %params.mid,
            "Trickle ignored"
        );
        Ok(())
    }
}
