//! Mock relay node.
//!
//! Every publish opens a controllable stream: the first event is the scripted
//! (or generated) answer, and the stream then stays open until the test
//! closes or fails it through [`MockRelay::close_stream`] /
//! [`MockRelay::fail_stream`].
//!
//! # Example
//!
//! ```rust,ignore
//! use signal_test_utils::MockRelay;
//!
//! let relay = MockRelay::new("sfu-1").with_publish_mid("m1");
//! // ... publish through the coordinator ...
//! relay.close_stream("m1");
//! ```

use async_trait::async_trait;
use common::types::Mid;
use signal_service::rpc::{
    PublishAnswer, PublishEvents, PublishRequest, PublishStream, RelayClient, RpcError,
    SessionDescription, StreamEvent, SubscribeAnswer, UnsubscribeResult,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Events fed to one open publish stream.
struct MockPublishEvents {
    first: Option<PublishAnswer>,
    rx: mpsc::UnboundedReceiver<StreamEvent>,
}

#[async_trait]
impl PublishEvents for MockPublishEvents {
    async fn next_event(&mut self) -> StreamEvent {
        if let Some(answer) = self.first.take() {
            return StreamEvent::Message(answer);
        }
        // A dropped sender reads as the relay closing its side.
        self.rx.recv().await.unwrap_or(StreamEvent::Closed)
    }
}

#[derive(Debug, Default)]
struct MockRelayInner {
    publish_mids: VecDeque<Mid>,
    publish_error: Option<RpcError>,
    publish_closes_immediately: bool,
    unpublish_error: Option<RpcError>,
    subscribe_error: Option<RpcError>,
    unsubscribe_error: Option<RpcError>,
    response_delay: Option<Duration>,
    streams: HashMap<Mid, mpsc::UnboundedSender<StreamEvent>>,
    publish_requests: Vec<PublishRequest>,
    unpublished: Vec<Mid>,
    subscribed: Vec<Mid>,
    unsubscribed: Vec<Mid>,
    generated: usize,
}

/// Scripted relay node.
#[derive(Debug, Clone)]
pub struct MockRelay {
    node_id: String,
    inner: Arc<Mutex<MockRelayInner>>,
}

impl MockRelay {
    /// Relay that answers every call successfully.
    ///
    /// Unscripted publishes get mids of the form `{node_id}-m{n}`.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            inner: Arc::new(Mutex::new(MockRelayInner::default())),
        }
    }

    /// Queue the mid assigned to the next publish.
    #[must_use]
    pub fn with_publish_mid(self, mid: impl Into<Mid>) -> Self {
        self.inner.lock().unwrap().publish_mids.push_back(mid.into());
        self
    }

    /// Reject every publish with `error` before the stream opens.
    #[must_use]
    pub fn with_publish_error(self, error: RpcError) -> Self {
        self.inner.lock().unwrap().publish_error = Some(error);
        self
    }

    /// Open publish streams that close before sending an answer.
    #[must_use]
    pub fn with_publish_closing_immediately(self) -> Self {
        self.inner.lock().unwrap().publish_closes_immediately = true;
        self
    }

    #[must_use]
    pub fn with_unpublish_error(self, error: RpcError) -> Self {
        self.inner.lock().unwrap().unpublish_error = Some(error);
        self
    }

    #[must_use]
    pub fn with_subscribe_error(self, error: RpcError) -> Self {
        self.inner.lock().unwrap().subscribe_error = Some(error);
        self
    }

    #[must_use]
    pub fn with_unsubscribe_error(self, error: RpcError) -> Self {
        self.inner.lock().unwrap().unsubscribe_error = Some(error);
        self
    }

    /// Delay every unary response (publish excluded) by `delay`.
    #[must_use]
    pub fn with_response_delay(self, delay: Duration) -> Self {
        self.inner.lock().unwrap().response_delay = Some(delay);
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// End the publish stream for `mid` the way a relay does when the
    /// publisher goes away. Returns false if no such stream is open.
    pub fn close_stream(&self, mid: &str) -> bool {
        self.end_stream(mid, StreamEvent::Closed)
    }

    /// Break the publish stream for `mid` with `error`.
    pub fn fail_stream(&self, mid: &str, error: RpcError) -> bool {
        self.end_stream(mid, StreamEvent::Failed(error))
    }

    fn end_stream(&self, mid: &str, event: StreamEvent) -> bool {
        let sender = self.inner.lock().unwrap().streams.remove(&Mid::from(mid));
        match sender {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Mids with a publish stream still open.
    pub fn open_streams(&self) -> Vec<Mid> {
        let mut mids: Vec<Mid> = self.inner.lock().unwrap().streams.keys().cloned().collect();
        mids.sort();
        mids
    }

    pub fn publish_requests(&self) -> Vec<PublishRequest> {
        self.inner.lock().unwrap().publish_requests.clone()
    }

    pub fn publish_count(&self) -> usize {
        self.inner.lock().unwrap().publish_requests.len()
    }

    pub fn unpublished(&self) -> Vec<Mid> {
        self.inner.lock().unwrap().unpublished.clone()
    }

    pub fn subscribed(&self) -> Vec<Mid> {
        self.inner.lock().unwrap().subscribed.clone()
    }

    pub fn unsubscribed(&self) -> Vec<Mid> {
        self.inner.lock().unwrap().unsubscribed.clone()
    }

    /// Total unary and stream calls served.
    pub fn call_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.publish_requests.len()
            + inner.unpublished.len()
            + inner.subscribed.len()
            + inner.unsubscribed.len()
    }

    async fn delay(&self) {
        let delay = self.inner.lock().unwrap().response_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RelayClient for MockRelay {
    async fn publish(&self, request: PublishRequest) -> Result<PublishStream, RpcError> {
        let mut inner = self.inner.lock().unwrap();
        inner.publish_requests.push(request);
        if let Some(error) = inner.publish_error.clone() {
            return Err(error);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if inner.publish_closes_immediately {
            drop(tx);
            return Ok(PublishStream::new(MockPublishEvents { first: None, rx }));
        }

        let mid = match inner.publish_mids.pop_front() {
            Some(mid) => mid,
            None => {
                inner.generated += 1;
                Mid::new(format!("{}-m{}", self.node_id, inner.generated))
            }
        };
        inner.streams.insert(mid.clone(), tx);

        let answer = PublishAnswer {
            mid: mid.clone(),
            answer: SessionDescription::answer(format!("v=0 answer for {mid}")),
            stream_info: serde_json::json!({ "node": self.node_id }),
        };
        Ok(PublishStream::new(MockPublishEvents {
            first: Some(answer),
            rx,
        }))
    }

    async fn unpublish(&self, mid: &Mid) -> Result<(), RpcError> {
        self.delay().await;
        let mut inner = self.inner.lock().unwrap();
        inner.unpublished.push(mid.clone());
        match inner.unpublish_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn subscribe(
        &self,
        mid: &Mid,
        offer: SessionDescription,
    ) -> Result<SubscribeAnswer, RpcError> {
        self.delay().await;
        let mut inner = self.inner.lock().unwrap();
        inner.subscribed.push(mid.clone());
        if let Some(error) = inner.subscribe_error.clone() {
            return Err(error);
        }
        Ok(SubscribeAnswer {
            mid: mid.clone(),
            answer: SessionDescription::answer(format!("answer to {}", offer.sdp)),
        })
    }

    async fn unsubscribe(&self, mid: &Mid) -> Result<UnsubscribeResult, RpcError> {
        self.delay().await;
        let mut inner = self.inner.lock().unwrap();
        inner.unsubscribed.push(mid.clone());
        if let Some(error) = inner.unsubscribe_error.clone() {
            return Err(error);
        }
        Ok(UnsubscribeResult { mid: mid.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::RoomId;

    fn request() -> PublishRequest {
        PublishRequest {
            rid: RoomId::from("room-1"),
            offer: SessionDescription::offer("v=0 offer"),
            options: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_publish_stream_answers_then_waits_for_close() {
        let relay = MockRelay::new("sfu-1").with_publish_mid("m1");
        let mut stream = relay.publish(request()).await.unwrap();

        match stream.recv().await {
            StreamEvent::Message(answer) => assert_eq!(answer.mid.as_str(), "m1"),
            other => unreachable!("expected answer, got {other:?}"),
        }
        assert_eq!(relay.open_streams(), vec![Mid::from("m1")]);

        assert!(relay.close_stream("m1"));
        assert_eq!(stream.recv().await, StreamEvent::Closed);
        assert!(relay.open_streams().is_empty());
    }

    #[tokio::test]
    async fn test_generated_mids_are_node_scoped() {
        let relay = MockRelay::new("sfu-2");
        let mut first = relay.publish(request()).await.unwrap();
        let mut second = relay.publish(request()).await.unwrap();

        let mids: Vec<_> = [first.recv().await, second.recv().await]
            .into_iter()
            .map(|event| match event {
                StreamEvent::Message(answer) => answer.mid.0,
                other => unreachable!("expected answer, got {other:?}"),
            })
            .collect();
        assert_eq!(mids, vec!["sfu-2-m1", "sfu-2-m2"]);
    }

    #[tokio::test]
    async fn test_injected_errors() {
        let relay = MockRelay::new("sfu-1").with_subscribe_error(RpcError::new(14, "down"));
        let result = relay
            .subscribe(&Mid::from("m1"), SessionDescription::offer("o"))
            .await;
        assert_eq!(result.unwrap_err().code, 14);
        assert_eq!(relay.subscribed(), vec![Mid::from("m1")]);
    }
}
