//! In-memory peer/room membership.
//!
//! A peer belongs to at most one room. Adding a peer to a second room moves
//! it. Rooms exist while they have members and are dropped as soon as the
//! last one leaves.

pub mod peer;

pub use peer::{Notification, Peer, StreamAddNotice};

use common::types::{PeerId, RoomId};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct RegistryState {
    rooms: HashMap<RoomId, HashMap<PeerId, Weak<Peer>>>,
    peer_rooms: HashMap<PeerId, RoomId>,
}

impl RegistryState {
    fn remove(&mut self, room_id: &RoomId, peer_id: &PeerId) -> bool {
        let Some(members) = self.rooms.get_mut(room_id) else {
            return false;
        };
        if members.remove(peer_id).is_none() {
            return false;
        }
        if members.is_empty() {
            self.rooms.remove(room_id);
            debug!(target: "signal.registry", room_id = %room_id, "Room emptied, removed");
        }
        if self.peer_rooms.get(peer_id) == Some(room_id) {
            self.peer_rooms.remove(peer_id);
        }
        true
    }
}

/// Result of [`PeerRegistry::add_peer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// The peer was already in the room; nothing changed.
    AlreadyMember,
    Added,
    /// The peer was moved out of the given room.
    Moved(RoomId),
}

impl AddOutcome {
    pub fn inserted(&self) -> bool {
        !matches!(self, AddOutcome::AlreadyMember)
    }
}

/// Shared membership store, constructed once and injected where needed.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    state: RwLock<RegistryState>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer to a room.
    ///
    /// Check and insert happen under one write lock, so of two concurrent
    /// adds of the same peer to the same room exactly one sees
    /// [`AddOutcome::Added`] or [`AddOutcome::Moved`].
    pub async fn add_peer(&self, room_id: &RoomId, peer: &Arc<Peer>) -> AddOutcome {
        let mut state = self.state.write().await;
        let peer_id = peer.id().clone();

        let outcome = match state.peer_rooms.get(&peer_id) {
            Some(current) if current == room_id => return AddOutcome::AlreadyMember,
            Some(current) => AddOutcome::Moved(current.clone()),
            None => AddOutcome::Added,
        };
        if let AddOutcome::Moved(old_room) = &outcome {
            state.remove(old_room, &peer_id);
        }

        state
            .rooms
            .entry(room_id.clone())
            .or_default()
            .insert(peer_id.clone(), Arc::downgrade(peer));
        state.peer_rooms.insert(peer_id.clone(), room_id.clone());

        debug!(
            target: "signal.registry",
            room_id = %room_id,
            peer_id = %peer_id,
            outcome = ?outcome,
            "Peer added to room"
        );
        outcome
    }

    /// Remove a peer from a room. Returns whether it was a member.
    pub async fn del_peer(&self, room_id: &RoomId, peer_id: &PeerId) -> bool {
        let removed = self.state.write().await.remove(room_id, peer_id);
        if removed {
            debug!(
                target: "signal.registry",
                room_id = %room_id,
                peer_id = %peer_id,
                "Peer removed from room"
            );
        }
        removed
    }

    pub async fn has_peer(&self, room_id: &RoomId, peer_id: &PeerId) -> bool {
        self.state.read().await.peer_rooms.get(peer_id) == Some(room_id)
    }

    /// Room the peer is currently in.
    pub async fn get_room_by_peer(&self, peer_id: &PeerId) -> Option<RoomId> {
        self.state.read().await.peer_rooms.get(peer_id).cloned()
    }

    pub async fn room_count(&self) -> usize {
        self.state.read().await.rooms.len()
    }

    pub async fn peer_count(&self) -> usize {
        self.state.read().await.peer_rooms.len()
    }
}
