//! Signaling error types.
//!
//! Every client action fails with a `(code, message)` pair. Validation codes
//! are fixed per failure kind; downstream failures pass the remote message
//! through verbatim. Internal details are logged server-side but not exposed
//! to clients.

use crate::discovery::Capability;
use crate::rpc::RpcError;
use thiserror::Error;

/// Code for a missing or unknown room ID.
pub const CODE_ROOM_ERROR: i32 = 4;

/// Code for a missing SDP payload.
pub const CODE_JSEP_ERROR: i32 = 6;

/// Code for a missing media ID.
pub const CODE_MID_ERROR: i32 = 8;

/// Code for a malformed action payload.
pub const CODE_INVALID_PAYLOAD: i32 = 400;

/// Code for an action name outside the protocol surface.
pub const CODE_UNKNOWN_ACTION: i32 = 405;

/// Code for downstream and internal failures.
pub const CODE_INTERNAL_ERROR: i32 = 500;

/// Code for "no node advertises the required capability".
pub const CODE_SERVICE_UNAVAILABLE: i32 = 503;

/// Signaling error type.
///
/// Maps to the `(code, message)` pair returned to the transport:
/// - `Room`: 4, `Jsep`: 6, `Mid`: 8 (validation, static messages)
/// - `InvalidPayload`: 400, `UnknownAction`: 405
/// - `Downstream`, `Internal`: 500
/// - `ServiceUnavailable`: 503
#[derive(Debug, Clone, Error)]
pub enum SignalError {
    /// Room ID missing, or the peer is not in any room.
    #[error("room not found")]
    Room,

    /// SDP offer missing.
    #[error("jsep not found")]
    Jsep,

    /// Media ID missing.
    #[error("mid not found")]
    Mid,

    /// No node advertises the required capability (or owns the resource).
    #[error("Not found any node for {0}.")]
    ServiceUnavailable(Capability),

    /// A remote call returned an error or timed out.
    #[error("Downstream call failed: {0}")]
    Downstream(RpcError),

    /// Action payload could not be decoded.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Action name is not part of the protocol.
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Internal error with context.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SignalError {
    /// Returns the protocol error code for this error.
    pub fn error_code(&self) -> i32 {
        match self {
            SignalError::Room => CODE_ROOM_ERROR,
            SignalError::Jsep => CODE_JSEP_ERROR,
            SignalError::Mid => CODE_MID_ERROR,
            SignalError::InvalidPayload(_) => CODE_INVALID_PAYLOAD,
            SignalError::UnknownAction(_) => CODE_UNKNOWN_ACTION,
            SignalError::Downstream(_) | SignalError::Internal(_) => CODE_INTERNAL_ERROR,
            SignalError::ServiceUnavailable(_) => CODE_SERVICE_UNAVAILABLE,
        }
    }

    /// Returns a bounded label string for the error variant (for metrics).
    pub fn error_type_label(&self) -> &'static str {
        match self {
            SignalError::Room => "room",
            SignalError::Jsep => "jsep",
            SignalError::Mid => "mid",
            SignalError::ServiceUnavailable(_) => "service_unavailable",
            SignalError::Downstream(_) => "downstream",
            SignalError::InvalidPayload(_) => "invalid_payload",
            SignalError::UnknownAction(_) => "unknown_action",
            SignalError::Internal(_) => "internal",
        }
    }

    /// Returns the message sent to the client.
    ///
    /// Downstream failures carry the remote message verbatim; internal
    /// errors never leak details.
    pub fn client_message(&self) -> String {
        match self {
            SignalError::Room
            | SignalError::Jsep
            | SignalError::Mid
            | SignalError::ServiceUnavailable(_) => self.to_string(),
            SignalError::Downstream(err) if !err.message.is_empty() => err.message.clone(),
            SignalError::Downstream(_) => "downstream call failed".to_string(),
            SignalError::InvalidPayload(_) => "invalid payload".to_string(),
            SignalError::UnknownAction(action) => format!("unknown action: {action}"),
            SignalError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

impl From<RpcError> for SignalError {
    fn from(err: RpcError) -> Self {
        SignalError::Downstream(err)
    }
}
