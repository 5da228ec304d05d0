//! Mock directory service.
//!
//! Records every call in arrival order and keeps a live view of published
//! streams per room (stream-add inserts, stream-remove deletes), so a peer
//! joining after a publish sees the stream in its catch-up the way it would
//! against a real directory.
//!
//! Most directory calls from the router are fire-and-forget, so tests wait
//! for them with [`MockDirectory::wait_for`].

use async_trait::async_trait;
use common::types::{PeerId, RoomId};
use serde_json::Value;
use signal_service::rpc::{DirectoryClient, PublishedStream, RpcError, StreamRemoval};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How long [`MockDirectory::wait_for`] waits before failing the test.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(2);

/// One recorded directory call.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryCall {
    OnJoin { rid: RoomId, uid: PeerId, info: Value },
    OnLeave { rid: RoomId, uid: PeerId },
    GetPubs { rid: RoomId },
    StreamAdd(PublishedStream),
    StreamRemove(StreamRemoval),
    Broadcast { rid: RoomId, uid: PeerId, info: Value },
}

impl DirectoryCall {
    pub fn is_stream_add(&self) -> bool {
        matches!(self, DirectoryCall::StreamAdd(_))
    }

    pub fn is_stream_remove(&self) -> bool {
        matches!(self, DirectoryCall::StreamRemove(_))
    }
}

#[derive(Debug, Default)]
struct MockDirectoryInner {
    calls: Vec<DirectoryCall>,
    streams: Vec<PublishedStream>,
    on_join_error: Option<RpcError>,
    on_leave_error: Option<RpcError>,
    get_pubs_error: Option<RpcError>,
    on_leave_delay: Option<Duration>,
}

/// In-memory directory service.
#[derive(Debug, Clone, Default)]
pub struct MockDirectory {
    inner: Arc<Mutex<MockDirectoryInner>>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stream published before the test started.
    #[must_use]
    pub fn with_stream(self, stream: PublishedStream) -> Self {
        self.inner.lock().unwrap().streams.push(stream);
        self
    }

    #[must_use]
    pub fn with_on_join_error(self, error: RpcError) -> Self {
        self.inner.lock().unwrap().on_join_error = Some(error);
        self
    }

    #[must_use]
    pub fn with_on_leave_error(self, error: RpcError) -> Self {
        self.inner.lock().unwrap().on_leave_error = Some(error);
        self
    }

    #[must_use]
    pub fn with_get_pubs_error(self, error: RpcError) -> Self {
        self.inner.lock().unwrap().get_pubs_error = Some(error);
        self
    }

    /// Make on-leave hang for `delay` before answering.
    #[must_use]
    pub fn with_on_leave_delay(self, delay: Duration) -> Self {
        self.inner.lock().unwrap().on_leave_delay = Some(delay);
        self
    }

    /// Every call so far, in arrival order.
    pub fn calls(&self) -> Vec<DirectoryCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Count calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&DirectoryCall) -> bool) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| predicate(call))
            .count()
    }

    /// Streams currently recorded for `rid`.
    pub fn streams_in(&self, rid: &RoomId) -> Vec<PublishedStream> {
        self.inner
            .lock()
            .unwrap()
            .streams
            .iter()
            .filter(|stream| &stream.rid == rid)
            .cloned()
            .collect()
    }

    /// Wait until at least `expected` calls match `predicate`.
    ///
    /// Panics after [`WAIT_TIMEOUT`].
    pub async fn wait_for(&self, expected: usize, predicate: impl Fn(&DirectoryCall) -> bool) {
        let wait = async {
            while self.count(&predicate) < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        if tokio::time::timeout(WAIT_TIMEOUT, wait).await.is_err() {
            panic!(
                "timed out waiting for {expected} matching directory calls, saw {:?}",
                self.calls()
            );
        }
    }

    fn record(&self, call: DirectoryCall) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl DirectoryClient for MockDirectory {
    async fn on_join(&self, rid: &RoomId, uid: &PeerId, info: &Value) -> Result<(), RpcError> {
        self.record(DirectoryCall::OnJoin {
            rid: rid.clone(),
            uid: uid.clone(),
            info: info.clone(),
        });
        match self.inner.lock().unwrap().on_join_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn on_leave(&self, rid: &RoomId, uid: &PeerId) -> Result<(), RpcError> {
        self.record(DirectoryCall::OnLeave {
            rid: rid.clone(),
            uid: uid.clone(),
        });
        let delay = self.inner.lock().unwrap().on_leave_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.inner.lock().unwrap().on_leave_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn get_pubs(&self, rid: &RoomId) -> Result<Vec<PublishedStream>, RpcError> {
        self.record(DirectoryCall::GetPubs { rid: rid.clone() });
        if let Some(error) = self.inner.lock().unwrap().get_pubs_error.clone() {
            return Err(error);
        }
        Ok(self.streams_in(rid))
    }

    async fn stream_add(&self, stream: PublishedStream) -> Result<(), RpcError> {
        self.record(DirectoryCall::StreamAdd(stream.clone()));
        self.inner.lock().unwrap().streams.push(stream);
        Ok(())
    }

    async fn stream_remove(&self, removal: StreamRemoval) -> Result<(), RpcError> {
        self.record(DirectoryCall::StreamRemove(removal.clone()));
        self.inner.lock().unwrap().streams.retain(|stream| {
            let same_owner = stream.rid == removal.rid && stream.uid == removal.uid;
            let same_mid = removal.mid.as_ref().map_or(true, |mid| &stream.mid == mid);
            !(same_owner && same_mid)
        });
        Ok(())
    }

    async fn broadcast(&self, rid: &RoomId, uid: &PeerId, info: &Value) -> Result<(), RpcError> {
        self.record(DirectoryCall::Broadcast {
            rid: rid.clone(),
            uid: uid.clone(),
            info: info.clone(),
        });
        Ok(())
    }
}
