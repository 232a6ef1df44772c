//! Room index: circle id to the set of users currently present.

use std::collections::{BTreeSet, HashMap};

/// Rooms and their present members.
///
/// An entry exists only while its member set is non-empty.
#[derive(Debug, Default)]
pub struct RoomIndex {
    rooms: HashMap<String, BTreeSet<String>>,
}

impl RoomIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `user_id` to `room_id`, creating the room if needed.
    /// Returns `true` if the user was not already present.
    pub fn join(&mut self, room_id: &str, user_id: &str) -> bool {
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(user_id.to_string())
    }

    /// Remove `user_id` from `room_id`, dropping the room when it empties.
    /// Returns `true` if the user was present.
    pub fn leave(&mut self, room_id: &str, user_id: &str) -> bool {
        let Some(members) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let removed = members.remove(user_id);
        if members.is_empty() {
            self.rooms.remove(room_id);
        }
        removed
    }

    /// Members of `room_id`; empty if the room is unknown.
    pub fn members_of(&self, room_id: &str) -> BTreeSet<String> {
        self.rooms.get(room_id).cloned().unwrap_or_default()
    }

    /// Iterate members without cloning the set.
    pub fn members(&self, room_id: &str) -> impl Iterator<Item = &String> {
        self.rooms.get(room_id).into_iter().flatten()
    }

    /// Number of room entries held.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
