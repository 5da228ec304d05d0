//! Client action payloads.
//!
//! Every field defaults when absent so a missing room or media ID reaches
//! validation (with its dedicated error code) instead of failing as a
//! malformed payload.

use crate::rpc::{PublishOptions, SessionDescription};
use common::types::{Mid, PeerId, RoomId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct JoinParams {
    pub rid: RoomId,
    pub info: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LeaveParams {
    pub rid: RoomId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PublishParams {
    pub jsep: SessionDescription,
    pub options: PublishOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UnpublishParams {
    pub rid: RoomId,
    pub mid: Mid,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SubscribeParams {
    pub mid: Mid,
    pub jsep: SessionDescription,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UnsubscribeParams {
    pub mid: Mid,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BroadcastParams {
    pub rid: RoomId,
    pub uid: PeerId,
    pub info: Value,
}

/// ICE candidate exchange. Accepted and ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrickleParams {
    pub rid: RoomId,
    pub mid: Mid,
    pub trickle: Value,
}

/// Publish result: the relay's answer and the assigned media ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishResult {
    pub mid: Mid,
    pub jsep: SessionDescription,
}
