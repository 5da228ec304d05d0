//! Directory service client.

use super::{decode_blob, encode_blob, RpcError};
use async_trait::async_trait;
use common::types::{Mid, NodeId, PeerId, RoomId};
use proto_gen::directory as proto;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tonic::transport::Channel;

/// A published stream as recorded by the directory service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedStream {
    pub rid: RoomId,
    pub uid: PeerId,
    pub mid: Mid,
    pub nid: NodeId,
    /// Relay-assigned stream metadata.
    pub info: Value,
}

impl From<proto::PubInfo> for PublishedStream {
    fn from(value: proto::PubInfo) -> Self {
        Self {
            rid: RoomId::new(value.rid),
            uid: PeerId::new(value.uid),
            mid: Mid::new(value.mid),
            nid: NodeId::new(value.nid),
            info: decode_blob(&value.stream_info),
        }
    }
}

/// Stream removal notice.
///
/// Without `mid` it covers every stream of the peer in the room (used on
/// leave); without `nid` the directory resolves the node itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRemoval {
    pub rid: RoomId,
    pub uid: PeerId,
    pub nid: Option<NodeId>,
    pub mid: Option<Mid>,
}

impl From<StreamRemoval> for proto::StreamRemoveRequest {
    fn from(value: StreamRemoval) -> Self {
        Self {
            rid: value.rid.0,
            nid: value.nid.map(|n| n.0).unwrap_or_default(),
            uid: value.uid.0,
            mid: value.mid.map(|m| m.0).unwrap_or_default(),
        }
    }
}

/// Calls the directory service serves.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn on_join(&self, rid: &RoomId, uid: &PeerId, info: &Value) -> Result<(), RpcError>;

    async fn on_leave(&self, rid: &RoomId, uid: &PeerId) -> Result<(), RpcError>;

    /// Streams currently published in a room.
    async fn get_pubs(&self, rid: &RoomId) -> Result<Vec<PublishedStream>, RpcError>;

    async fn stream_add(&self, stream: PublishedStream) -> Result<(), RpcError>;

    async fn stream_remove(&self, removal: StreamRemoval) -> Result<(), RpcError>;

    async fn broadcast(&self, rid: &RoomId, uid: &PeerId, info: &Value) -> Result<(), RpcError>;
}

/// gRPC directory client over a shared channel.
#[derive(Debug, Clone)]
pub struct GrpcDirectoryClient {
    client: proto::DirectoryServiceClient<Channel>,
}

impl GrpcDirectoryClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: proto::DirectoryServiceClient::new(channel),
        }
    }
}

#[async_trait]
impl DirectoryClient for GrpcDirectoryClient {
    async fn on_join(&self, rid: &RoomId, uid: &PeerId, info: &Value) -> Result<(), RpcError> {
        let mut client = self.client.clone();
        client
            .on_join(proto::OnJoinRequest {
                rid: rid.to_string(),
                uid: uid.to_string(),
                info: encode_blob(info),
            })
            .await?;
        Ok(())
    }

    async fn on_leave(&self, rid: &RoomId, uid: &PeerId) -> Result<(), RpcError> {
        let mut client = self.client.clone();
        client
            .on_leave(proto::OnLeaveRequest {
                rid: rid.to_string(),
                uid: uid.to_string(),
            })
            .await?;
        Ok(())
    }

    async fn get_pubs(&self, rid: &RoomId) -> Result<Vec<PublishedStream>, RpcError> {
        let mut client = self.client.clone();
        let reply = client
            .get_pubs(proto::GetPubsRequest {
                rid: rid.to_string(),
            })
            .await?
            .into_inner();
        Ok(reply.pubs.into_iter().map(PublishedStream::from).collect())
    }

    async fn stream_add(&self, stream: PublishedStream) -> Result<(), RpcError> {
        let mut client = self.client.clone();
        client
            .stream_add(proto::StreamAddRequest {
                rid: stream.rid.0,
                nid: stream.nid.0,
                uid: stream.uid.0,
                mid: stream.mid.0,
                stream_info: encode_blob(&stream.info),
            })
            .await?;
        Ok(())
    }

    async fn stream_remove(&self, removal: StreamRemoval) -> Result<(), RpcError> {
        let mut client = self.client.clone();
        client
            .stream_remove(proto::StreamRemoveRequest::from(removal))
            .await?;
        Ok(())
    }

    async fn broadcast(&self, rid: &RoomId, uid: &PeerId, info: &Value) -> Result<(), RpcError> {
        let mut client = self.client.clone();
        client
            .broadcast(proto::BroadcastRequest {
                rid: rid.to_string(),
                uid: uid.to_string(),
                info: encode_blob(info),
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_published_stream_from_pub_info() {
        let stream = PublishedStream::from(proto::PubInfo {
            rid: "r1".to_string(),
            uid: "alice".to_string(),
            mid: "m1".to_string(),
            nid: "sfu-1".to_string(),
            stream_info: r#"{"tracks":1}"#.to_string(),
        });

        assert_eq!(stream.rid.as_str(), "r1");
        assert_eq!(stream.nid.as_str(), "sfu-1");
        assert_eq!(stream.info, json!({"tracks": 1}));
    }

    #[test]
    fn test_peer_wide_removal_leaves_mid_and_nid_empty() {
        let request = proto::StreamRemoveRequest::from(StreamRemoval {
            rid: RoomId::from("r1"),
            uid: PeerId::from("alice"),
            nid: None,
            mid: None,
        });

        assert_eq!(request.rid, "r1");
        assert_eq!(request.uid, "alice");
        assert!(request.mid.is_empty());
        assert!(request.nid.is_empty());
    }

    #[test]
    fn test_keyed_removal_carries_mid_and_nid() {
        let request = proto::StreamRemoveRequest::from(StreamRemoval {
            rid: RoomId::from("r1"),
            uid: PeerId::from("alice"),
            nid: Some(NodeId::from("sfu-2")),
            mid: Some(Mid::from("m7")),
        });

        assert_eq!(request.mid, "m7");
        assert_eq!(request.nid, "sfu-2");
    }
}
