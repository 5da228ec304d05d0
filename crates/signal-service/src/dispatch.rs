//! Transport-facing entry point.
//!
//! The transport hands every inbound `(peer, action, payload)` to
//! [`Dispatcher::handle`] and must call [`Dispatcher::disconnect`] when a
//! connection goes away.
//!
//! Caller-side policies applied here:
//!
//! - A join for a new room while already in another one leaves the old
//!   room first
//! - A disconnect runs leave for the peer's current room

use crate::errors::SignalError;
use crate::observability::metrics;
use crate::protocol::{
    BroadcastParams, JoinParams, LeaveParams, PublishParams, SubscribeParams, TrickleParams,
    UnpublishParams, UnsubscribeParams,
};
use crate::registry::Peer;
use crate::session::SessionCoordinator;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Client actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Join,
    Leave,
    Publish,
    Unpublish,
    Subscribe,
    Unsubscribe,
    Broadcast,
    Trickle,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Join => "join",
            Action::Leave => "leave",
            Action::Publish => "publish",
            Action::Unpublish => "unpublish",
            Action::Subscribe => "subscribe",
            Action::Unsubscribe => "unsubscribe",
            Action::Broadcast => "broadcast",
            Action::Trickle => "trickle",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "join" => Ok(Action::Join),
            "leave" => Ok(Action::Leave),
            "publish" => Ok(Action::Publish),
            "unpublish" => Ok(Action::Unpublish),
            "subscribe" => Ok(Action::Subscribe),
            "unsubscribe" => Ok(Action::Unsubscribe),
            "broadcast" => Ok(Action::Broadcast),
            "trickle" => Ok(Action::Trickle),
            other => Err(SignalError::UnknownAction(other.to_string())),
        }
    }
}

fn parse<T: DeserializeOwned>(payload: Value) -> Result<T, SignalError> {
    let payload = if payload.is_null() {
        Value::Object(Map::new())
    } else {
        payload
    };
    serde_json::from_value(payload).map_err(|e| SignalError::InvalidPayload(e.to_string()))
}

fn to_value<T: Serialize>(result: &T) -> Result<Value, SignalError> {
    serde_json::to_value(result).map_err(|e| SignalError::Internal(e.to_string()))
}

fn empty() -> Value {
    Value::Object(Map::new())
}

/// Routes client actions to the [`SessionCoordinator`].
#[derive(Clone)]
pub struct Dispatcher {
    coordinator: Arc<SessionCoordinator>,
}

impl Dispatcher {
    pub fn new(coordinator: Arc<SessionCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Handle one client action and return its result payload.
    pub async fn handle(
        &self,
        peer: &Arc<Peer>,
        action: &str,
        payload: Value,
    ) -> Result<Value, SignalError> {
        let start = Instant::now();
        let result = match action.parse::<Action>() {
            Ok(action) => self.route(peer, action, payload).await,
            Err(err) => Err(err),
        };

        let label = action
            .parse::<Action>()
            .map_or("unknown", Action::as_str);
        let status = match &result {
            Ok(_) => "success",
            Err(err) => err.error_type_label(),
        };
        metrics::record_action(label, status, start.elapsed());

        if let Err(err) = &result {
            debug!(
                target: "signal.dispatch",
                peer_id = %peer.id(),
                action = %action,
                code = err.error_code(),
                error = %err,
                "Action failed"
            );
        }
        result
    }

    async fn route(
        &self,
        peer: &Arc<Peer>,
        action: Action,
        payload: Value,
    ) -> Result<Value, SignalError> {
        let session = &self.coordinator;
        match action {
            Action::Join => {
                let params: JoinParams = parse(payload)?;
                self.leave_previous_room(peer, &params).await?;
                session.join(peer, params).await.map(|()| empty())
            }
            Action::Leave => session.leave(peer, parse(payload)?).await.map(|()| empty()),
            Action::Publish => {
                let params: PublishParams = parse(payload)?;
                to_value(&session.publish(peer, params).await?)
            }
            Action::Unpublish => {
                let params: UnpublishParams = parse(payload)?;
                session.unpublish(peer, params).await.map(|()| empty())
            }
            Action::Subscribe => {
                let params: SubscribeParams = parse(payload)?;
                to_value(&session.subscribe(peer, params).await?)
            }
            Action::Unsubscribe => {
                let params: UnsubscribeParams = parse(payload)?;
                to_value(&session.unsubscribe(peer, params).await?)
            }
            Action::Broadcast => {
                let params: BroadcastParams = parse(payload)?;
                session.broadcast(peer, params).await.map(|()| empty())
            }
            Action::Trickle => {
                let params: TrickleParams = parse(payload)?;
                session.trickle(peer, params).await.map(|()| empty())
            }
        }
    }

    /// Room-switch policy: leave the current room before joining another.
    async fn leave_previous_room(
        &self,
        peer: &Arc<Peer>,
        params: &JoinParams,
    ) -> Result<(), SignalError> {
        if params.rid.is_empty() {
            return Ok(());
        }
        let current = self.coordinator.registry().get_room_by_peer(peer.id()).await;
        match current {
            Some(rid) if rid != params.rid => {
                debug!(
                    target: "signal.dispatch",
                    peer_id = %peer.id(),
                    from = %rid,
                    to = %params.rid,
                    "Switching rooms"
                );
                self.coordinator.leave(peer, LeaveParams { rid }).await
            }
            _ => Ok(()),
        }
    }

    /// Clean up after a closed connection: leave the peer's current room.
    ///
    /// Membership is dropped even if the directory cannot be reached.
    pub async fn disconnect(&self, peer: &Arc<Peer>) {
        let registry = self.coordinator.registry();
        let Some(rid) = registry.get_room_by_peer(peer.id()).await else {
            return;
        };

        if let Err(err) = self
            .coordinator
            .leave(peer, LeaveParams { rid: rid.clone() })
            .await
        {
            warn!(
                target: "signal.dispatch",
                peer_id = %peer.id(),
                room_id = %rid,
                error = %err,
                "Leave on disconnect failed, dropping membership"
            );
            registry.del_peer(&rid, peer.id()).await;
        }
    }
}
