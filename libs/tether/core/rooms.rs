//! Room membership
//!
//! Tracks which rooms the application asked to be in. Acknowledgments only
//! drive UI feedback; membership itself is what gets replayed after a
//! reconnect.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Not yet requested on the current link
    Pending,
    /// `join_room` sent, waiting for `room_joined`
    Requested,
    /// Acknowledged by the server
    Joined,
}

#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<BTreeMap<String, RoomStatus>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a join request; false if the room was already tracked
    pub fn request_join(&self, room_id: &str) -> bool {
        let mut rooms = self.rooms.write();
        if rooms.contains_key(room_id) {
            return false;
        }
        rooms.insert(room_id.to_string(), RoomStatus::Pending);
        true
    }

    /// Move a room from `Requested` back to `Pending`
    ///
    /// Used when a join could not be written; returns true if the room was
    /// released.
    pub fn release(&self, room_id: &str) -> bool {
        match self.rooms.write().get_mut(room_id) {
            Some(status) if *status == RoomStatus::Requested => {
                *status = RoomStatus::Pending;
                true
            }
            _ => false,
        }
    }

    /// Claim every pending room at once
    pub fn take_pending(&self) -> Vec<String> {
        let mut rooms = self.rooms.write();
        rooms
            .iter_mut()
            .filter(|(_, status)| **status == RoomStatus::Pending)
            .map(|(id, status)| {
                *status = RoomStatus::Requested;
                id.clone()
            })
            .collect()
    }

    /// Forget a room; false if it was not tracked
    pub fn request_leave(&self, room_id: &str) -> bool {
        self.rooms.write().remove(room_id).is_some()
    }

    pub fn acknowledge_joined(&self, room_id: &str) {
        match self.rooms.write().get_mut(room_id) {
            Some(status) => *status = RoomStatus::Joined,
            None => debug!("room_joined for untracked room '{}'", room_id),
        }
    }

    pub fn acknowledge_left(&self, room_id: &str) {
        if self.rooms.read().contains_key(room_id) {
            debug!("room_left for '{}' which is tracked again", room_id);
        }
    }

    /// Rooms whose join still has to be sent on the current link
    pub fn pending(&self) -> Vec<String> {
        self.rooms
            .read()
            .iter()
            .filter(|(_, status)| **status == RoomStatus::Pending)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// The link is gone; every room must be requested again
    pub fn mark_all_pending(&self) {
        for status in self.rooms.write().values_mut() {
            *status = RoomStatus::Pending;
        }
    }

    pub fn status(&self, room_id: &str) -> Option<RoomStatus> {
        self.rooms.read().get(room_id).copied()
    }

    pub fn is_joined(&self, room_id: &str) -> bool {
        self.status(room_id) == Some(RoomStatus::Joined)
    }

    pub fn rooms(&self) -> Vec<(String, RoomStatus)> {
        self.rooms
            .read()
            .iter()
            .map(|(id, status)| (id.clone(), *status))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.read().is_empty()
    }

    pub fn clear(&self) {
        self.rooms.write().clear();
    }
}
