//! Relay node client.
//!
//! [`RelayClient`] is the seam the session coordinator calls; the gRPC
//! implementation translates between these types and the
//! `signal.relay.RelayService` messages.

use super::{decode_blob, RpcError};
use async_trait::async_trait;
use common::types::{Mid, RoomId};
use proto_gen::relay as proto;
use serde::{Deserialize, Serialize};
use tonic::transport::Channel;

/// SDP offer or answer as exchanged with clients (`{"type", "sdp"}`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type", default)]
    pub sdp_type: String,
    #[serde(default)]
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: "offer".to_string(),
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: "answer".to_string(),
            sdp: sdp.into(),
        }
    }

    /// An SDP with no body is treated as absent.
    pub fn is_empty(&self) -> bool {
        self.sdp.is_empty()
    }
}

impl From<SessionDescription> for proto::SessionDescription {
    fn from(value: SessionDescription) -> Self {
        Self {
            r#type: value.sdp_type,
            sdp: value.sdp,
        }
    }
}

impl From<proto::SessionDescription> for SessionDescription {
    fn from(value: proto::SessionDescription) -> Self {
        Self {
            sdp_type: value.r#type,
            sdp: value.sdp,
        }
    }
}

/// Publisher media options.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishOptions {
    pub codec: String,
    pub bandwidth: u32,
    #[serde(rename = "transportcc")]
    pub transport_cc: bool,
}

impl From<PublishOptions> for proto::PublishOptions {
    fn from(value: PublishOptions) -> Self {
        Self {
            codec: value.codec,
            bandwidth: value.bandwidth,
            transport_cc: value.transport_cc,
        }
    }
}

/// Publish call parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub rid: RoomId,
    pub offer: SessionDescription,
    pub options: PublishOptions,
}

impl From<PublishRequest> for proto::PublishRequest {
    fn from(value: PublishRequest) -> Self {
        Self {
            rid: value.rid.0,
            options: Some(value.options.into()),
            description: Some(value.offer.into()),
        }
    }
}

/// A message on the publish stream. The first one carries the answer and
/// the relay-assigned stream identity.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishAnswer {
    pub mid: Mid,
    pub answer: SessionDescription,
    pub stream_info: serde_json::Value,
}

impl From<proto::PublishReply> for PublishAnswer {
    fn from(reply: proto::PublishReply) -> Self {
        Self {
            mid: Mid::new(reply.mediainfo.map(|info| info.mid).unwrap_or_default()),
            answer: reply.description.map(Into::into).unwrap_or_default(),
            stream_info: decode_blob(&reply.stream_info),
        }
    }
}

/// Subscribe result returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeAnswer {
    pub mid: Mid,
    #[serde(rename = "jsep")]
    pub answer: SessionDescription,
}

impl From<proto::SubscribeReply> for SubscribeAnswer {
    fn from(reply: proto::SubscribeReply) -> Self {
        Self {
            mid: Mid::new(reply.mid),
            answer: reply.description.map(Into::into).unwrap_or_default(),
        }
    }
}

/// Unsubscribe result returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeResult {
    pub mid: Mid,
}

/// One step of a publish stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Message(PublishAnswer),
    /// The relay closed its send side.
    Closed,
    /// The stream broke with an error.
    Failed(RpcError),
}

/// Source of publish stream events.
#[async_trait]
pub trait PublishEvents: Send {
    async fn next_event(&mut self) -> StreamEvent;
}

/// Long-lived publish stream.
///
/// A finite sequence of events: zero or more `Message`s, then one terminal
/// `Closed` or `Failed`. After the terminal event every `recv` yields
/// `Closed`.
pub struct PublishStream {
    events: Box<dyn PublishEvents>,
    finished: bool,
}

impl PublishStream {
    pub fn new(events: impl PublishEvents + 'static) -> Self {
        Self {
            events: Box::new(events),
            finished: false,
        }
    }

    pub async fn recv(&mut self) -> StreamEvent {
        if self.finished {
            return StreamEvent::Closed;
        }
        let event = self.events.next_event().await;
        if !matches!(event, StreamEvent::Message(_)) {
            self.finished = true;
        }
        event
    }
}

/// Calls a relay node serves.
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Open a publish stream.
    async fn publish(&self, request: PublishRequest) -> Result<PublishStream, RpcError>;

    async fn unpublish(&self, mid: &Mid) -> Result<(), RpcError>;

    async fn subscribe(
        &self,
        mid: &Mid,
        offer: SessionDescription,
    ) -> Result<SubscribeAnswer, RpcError>;

    async fn unsubscribe(&self, mid: &Mid) -> Result<UnsubscribeResult, RpcError>;
}

/// gRPC relay client over a shared channel.
#[derive(Debug, Clone)]
pub struct GrpcRelayClient {
    client: proto::RelayServiceClient<Channel>,
}

impl GrpcRelayClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: proto::RelayServiceClient::new(channel),
        }
    }
}

struct GrpcPublishEvents {
    stream: tonic::Streaming<proto::PublishReply>,
}

#[async_trait]
impl PublishEvents for GrpcPublishEvents {
    async fn next_event(&mut self) -> StreamEvent {
        match self.stream.message().await {
            Ok(Some(reply)) => StreamEvent::Message(reply.into()),
            Ok(None) => StreamEvent::Closed,
            Err(status) => StreamEvent::Failed(status.into()),
        }
    }
}

#[async_trait]
impl RelayClient for GrpcRelayClient {
    async fn publish(&self, request: PublishRequest) -> Result<PublishStream, RpcError> {
        let mut client = self.client.clone();
        let stream = client
            .publish(proto::PublishRequest::from(request))
            .await?
            .into_inner();
        Ok(PublishStream::new(GrpcPublishEvents { stream }))
    }

    async fn unpublish(&self, mid: &Mid) -> Result<(), RpcError> {
        let mut client = self.client.clone();
        client
            .unpublish(proto::UnpublishRequest {
                mid: mid.to_string(),
            })
            .await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        mid: &Mid,
        offer: SessionDescription,
    ) -> Result<SubscribeAnswer, RpcError> {
        let mut client = self.client.clone();
        let reply = client
            .subscribe(proto::SubscribeRequest {
                mid: mid.to_string(),
                description: Some(offer.into()),
            })
            .await?
            .into_inner();
        Ok(reply.into())
    }

    async fn unsubscribe(&self, mid: &Mid) -> Result<UnsubscribeResult, RpcError> {
        let mut client = self.client.clone();
        let reply = client
            .unsubscribe(proto::UnsubscribeRequest {
                mid: mid.to_string(),
            })
            .await?
            .into_inner();
        Ok(UnsubscribeResult {
            mid: Mid::new(reply.mid),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<StreamEvent>);

    #[async_trait]
    impl PublishEvents for Scripted {
        async fn next_event(&mut self) -> StreamEvent {
            self.0.pop_front().unwrap_or(StreamEvent::Closed)
        }
    }

    fn answer(mid: &str) -> PublishAnswer {
        PublishAnswer {
            mid: Mid::from(mid),
            answer: SessionDescription::answer("v=0"),
            stream_info: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_session_description_json_shape() {
        let desc: SessionDescription =
            serde_json::from_value(json!({"type": "offer", "sdp": "v=0"})).unwrap();
        assert_eq!(desc, SessionDescription::offer("v=0"));

        let missing: SessionDescription = serde_json::from_value(json!({})).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_publish_options_defaults() {
        let options: PublishOptions =
            serde_json::from_value(json!({"codec": "vp8", "transportcc": true})).unwrap();
        assert_eq!(options.codec, "vp8");
        assert_eq!(options.bandwidth, 0);
        assert!(options.transport_cc);
    }

    #[test]
    fn test_publish_answer_from_reply() {
        let reply = proto::PublishReply {
            mediainfo: Some(proto::MediaInfo {
                mid: "m1".to_string(),
            }),
            description: Some(proto::SessionDescription {
                r#type: "answer".to_string(),
                sdp: "v=0 answer".to_string(),
            }),
            stream_info: r#"{"tracks":["audio","video"]}"#.to_string(),
        };

        let answer = PublishAnswer::from(reply);
        assert_eq!(answer.mid.as_str(), "m1");
        assert_eq!(answer.answer.sdp, "v=0 answer");
        assert_eq!(answer.stream_info, json!({"tracks": ["audio", "video"]}));
    }

    #[test]
    fn test_publish_answer_without_mediainfo_has_empty_mid() {
        let answer = PublishAnswer::from(proto::PublishReply::default());
        assert!(answer.mid.is_empty());
    }

    #[test]
    fn test_subscribe_answer_serializes_jsep() {
        let answer = SubscribeAnswer {
            mid: Mid::from("m1"),
            answer: SessionDescription::answer("v=0"),
        };
        let value = serde_json::to_value(&answer).unwrap();
        assert_eq!(
            value,
            json!({"mid": "m1", "jsep": {"type": "answer", "sdp": "v=0"}})
        );
    }

    #[tokio::test]
    async fn test_stream_yields_closed_after_terminal_event() {
        let mut stream = PublishStream::new(Scripted(VecDeque::from(vec![
            StreamEvent::Message(answer("m1")),
            StreamEvent::Failed(RpcError::new(14, "transport closed")),
            StreamEvent::Message(answer("m2")),
        ])));

        assert!(matches!(stream.recv().await, StreamEvent::Message(_)));
        assert!(matches!(stream.recv().await, StreamEvent::Failed(_)));
        assert_eq!(stream.recv().await, StreamEvent::Closed);
        assert_eq!(stream.recv().await, StreamEvent::Closed);
    }
}
