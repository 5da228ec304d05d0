//! RPC gateway toward relay nodes and the directory service.
//!
//! Three invocation modes:
//!
//! - [`RpcGateway::call_sync`] - awaits the reply, optionally under a timeout
//! - [`RpcGateway::call_async`] - spawns the call and returns an
//!   [`AsyncCall`] handle; continuations run on their own task
//! - [`RpcGateway::open_publish`] - long-lived server stream read through
//!   [`PublishStream::recv`]
//!
//! Transport errors and timeouts surface uniformly as [`RpcError`]. Nothing
//! is retried here; callers decide.

pub mod connector;
pub mod directory;
pub mod relay;

pub use connector::{spawn_channel_pruner, GrpcConnector, NodeConnector};
pub use directory::{DirectoryClient, PublishedStream, StreamRemoval};
pub use relay::{
    PublishAnswer, PublishEvents, PublishOptions, PublishRequest, PublishStream, RelayClient,
    SessionDescription, StreamEvent, SubscribeAnswer, UnsubscribeResult,
};

use crate::discovery::Node;
use crate::errors::SignalError;
use crate::observability::metrics;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// gRPC `DEADLINE_EXCEEDED`.
pub const CODE_DEADLINE_EXCEEDED: i32 = 4;

/// gRPC `UNKNOWN`, used when a call task dies before producing a result.
pub const CODE_UNKNOWN: i32 = 2;

/// Error returned by a remote call: a numeric code plus the remote message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Local deadline elapsed before the remote replied.
    pub fn timeout() -> Self {
        Self::new(CODE_DEADLINE_EXCEEDED, "request timed out")
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpc error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

impl From<tonic::Status> for RpcError {
    fn from(status: tonic::Status) -> Self {
        Self::new(status.code() as i32, status.message())
    }
}

/// Remote methods, used for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Publish,
    Unpublish,
    Subscribe,
    Unsubscribe,
    OnJoin,
    OnLeave,
    GetPubs,
    StreamAdd,
    StreamRemove,
    Broadcast,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Publish => "publish",
            Method::Unpublish => "unpublish",
            Method::Subscribe => "subscribe",
            Method::Unsubscribe => "unsubscribe",
            Method::OnJoin => "on_join",
            Method::OnLeave => "on_leave",
            Method::GetPubs => "get_pubs",
            Method::StreamAdd => "stream_add",
            Method::StreamRemove => "stream_remove",
            Method::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn status_label<T>(result: &Result<T, RpcError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(err) if err.code == CODE_DEADLINE_EXCEEDED => "timeout",
        Err(_) => "error",
    }
}

/// Handle to a call started with [`RpcGateway::call_async`].
///
/// The call is already running. Dropping the handle leaves it running
/// (fire-and-forget); [`AsyncCall::then`] attaches continuations.
pub struct AsyncCall<T> {
    method: Method,
    handle: JoinHandle<Result<T, RpcError>>,
}

impl<T: Send + 'static> AsyncCall<T> {
    /// Register success and failure continuations.
    ///
    /// Exactly one of them runs, on a task separate from the caller, after
    /// the result arrives. No ordering relative to the caller is implied.
    pub fn then<S, F>(self, on_success: S, on_failure: F)
    where
        S: FnOnce(T) + Send + 'static,
        F: FnOnce(RpcError) + Send + 'static,
    {
        tokio::spawn(async move {
            match self.wait().await {
                Ok(value) => on_success(value),
                Err(err) => on_failure(err),
            }
        });
    }

    /// Await the result directly.
    pub async fn wait(self) -> Result<T, RpcError> {
        match self.handle.await {
            Ok(result) => result,
            Err(join_err) => {
                warn!(
                    target: "signal.rpc",
                    method = %self.method,
                    error = %join_err,
                    "Async call task failed"
                );
                Err(RpcError::new(CODE_UNKNOWN, "call task aborted"))
            }
        }
    }
}

/// Gateway that owns client construction and call accounting.
#[derive(Clone)]
pub struct RpcGateway {
    connector: Arc<dyn NodeConnector>,
    relay_timeout: Duration,
}

impl RpcGateway {
    pub fn new(connector: Arc<dyn NodeConnector>, relay_timeout: Duration) -> Self {
        Self {
            connector,
            relay_timeout,
        }
    }

    /// Timeout applied to relay calls that gate a client-visible action.
    pub fn relay_timeout(&self) -> Duration {
        self.relay_timeout
    }

    /// Client for a resolved relay node.
    pub async fn relay(&self, node: &Node) -> Result<Arc<dyn RelayClient>, SignalError> {
        self.connector.relay(node).await.map_err(|e| {
            warn!(
                target: "signal.rpc",
                node_id = %node.id,
                error = %e,
                "Failed to connect to relay node"
            );
            SignalError::ServiceUnavailable(node.capability)
        })
    }

    /// Client for a resolved directory node.
    pub async fn directory(&self, node: &Node) -> Result<Arc<dyn DirectoryClient>, SignalError> {
        self.connector.directory(node).await.map_err(|e| {
            warn!(
                target: "signal.rpc",
                node_id = %node.id,
                error = %e,
                "Failed to connect to directory node"
            );
            SignalError::ServiceUnavailable(node.capability)
        })
    }

    /// Await a call. `None` means no deadline.
    pub async fn call_sync<T, Fut>(
        &self,
        method: Method,
        timeout: Option<Duration>,
        call: Fut,
    ) -> Result<T, RpcError>
    where
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let start = Instant::now();
        let result = match timeout {
            Some(deadline) => tokio::time::timeout(deadline, call)
                .await
                .unwrap_or_else(|_| Err(RpcError::timeout())),
            None => call.await,
        };
        let status = status_label(&result);
        metrics::record_rpc_call(method.as_str(), "sync", status, start.elapsed());

        if let Err(err) = &result {
            debug!(
                target: "signal.rpc",
                method = %method,
                code = err.code,
                error = %err.message,
                "Sync call failed"
            );
        }
        result
    }

    /// Start a call without waiting for it.
    pub fn call_async<T, Fut>(&self, method: Method, call: Fut) -> AsyncCall<T>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, RpcError>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let start = Instant::now();
            let result = call.await;
            let status = status_label(&result);
            metrics::record_rpc_call(method.as_str(), "async", status, start.elapsed());

            if let Err(err) = &result {
                debug!(
                    target: "signal.rpc",
                    method = %method,
                    code = err.code,
                    error = %err.message,
                    "Async call failed"
                );
            }
            result
        });
        AsyncCall { method, handle }
    }

    /// Open a publish stream on a relay node.
    pub async fn open_publish(
        &self,
        relay: &dyn RelayClient,
        request: PublishRequest,
    ) -> Result<PublishStream, RpcError> {
        let start = Instant::now();
        let result = relay.publish(request).await;
        let status = status_label(&result);
        metrics::record_rpc_call(Method::Publish.as_str(), "stream", status, start.elapsed());
        result
    }
}

/// Encode an opaque JSON blob for the wire. `null` travels as an empty string.
pub fn encode_blob(value: &serde_json::Value) -> String {
    if value.is_null() {
        String::new()
    } else {
        value.to_string()
    }
}

/// Decode an opaque JSON blob from the wire.
///
/// Empty strings become `null`; text that is not JSON is kept as a JSON
/// string instead of failing the call.
pub fn decode_blob(raw: &str) -> serde_json::Value {
    if raw.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}
