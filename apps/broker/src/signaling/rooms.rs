//! Room index: membership, per-room capacity, and same-room routing.
//!
//! One mutex serializes every membership mutation, and the client's `room`
//! field is written while that lock is held. The field and the index can
//! therefore never disagree, even mid-switch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::signaling::registry::{ClientHandle, ClientRegistry};

pub const MAX_ROOM_NAME_LEN: usize = 64;

/// Room names must match `[A-Za-z0-9_-]{1,64}`.
pub fn valid_room_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_ROOM_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Result of a join attempt.
#[derive(Debug)]
pub enum JoinOutcome {
    Joined {
        /// Members present before the join, excluding the joiner.
        peers: Vec<String>,
        /// Room left as part of a switch, with its remaining members.
        left: Option<(String, Vec<String>)>,
    },
    /// Already a member of the target room; membership untouched.
    Rejoined { peers: Vec<String> },
    RoomFull,
    InvalidName,
}

pub struct RoomIndex {
    rooms: Mutex<HashMap<String, HashSet<String>>>,
    max_room_clients: usize,
}

impl RoomIndex {
    pub fn new(max_room_clients: usize) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            max_room_clients,
        }
    }

    /// Atomic leave-then-join. A full target room leaves the client in its
    /// previous room (or none).
    pub fn join(&self, client: &ClientHandle, name: &str) -> JoinOutcome {
        if !valid_room_name(name) {
            return JoinOutcome::InvalidName;
        }
        let mut rooms = self.rooms.lock();
        let mut room_field = client.room.lock();

        if room_field.as_deref() == Some(name) {
            let peers = members_except(&rooms, name, &client.id);
            return JoinOutcome::Rejoined { peers };
        }
        if rooms
            .get(name)
            .is_some_and(|m| m.len() >= self.max_room_clients)
        {
            return JoinOutcome::RoomFull;
        }

        let left = room_field
            .take()
            .map(|old| {
                let remaining = remove_member(&mut rooms, &old, &client.id);
                (old, remaining)
            });

        let members = rooms.entry(name.to_string()).or_default();
        let peers: Vec<String> = members.iter().cloned().collect();
        members.insert(client.id.clone());
        *room_field = Some(name.to_string());

        JoinOutcome::Joined { peers, left }
    }

    /// Remove the client from its room, if any, deleting the room entry in
    /// the same step when it empties. Returns the left room and its
    /// remaining members.
    pub fn leave(&self, client: &ClientHandle) -> Option<(String, Vec<String>)> {
        let mut rooms = self.rooms.lock();
        let mut room_field = client.room.lock();
        let name = room_field.take()?;
        let remaining = remove_member(&mut rooms, &name, &client.id);
        Some((name, remaining))
    }

    /// Member ids of a room; empty when the room does not exist.
    pub fn peers(&self, name: &str) -> Vec<String> {
        self.rooms
            .lock()
            .get(name)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rooms.lock().contains_key(name)
    }

    /// Resolve a relay target: `Some` only when both sender and target are
    /// in the same, set room.
    pub fn resolve_same_room(
        &self,
        sender: &ClientHandle,
        target_id: &str,
        registry: &ClientRegistry,
    ) -> Option<Arc<ClientHandle>> {
        let target = registry.lookup(target_id)?;
        let sender_room = sender.room.lock().clone()?;
        let target_room = target.room.lock().clone()?;
        (sender_room == target_room).then_some(target)
    }

    /// Room-name → member-ids snapshot for the status endpoint.
    pub fn snapshot(&self) -> HashMap<String, Vec<String>> {
        self.rooms
            .lock()
            .iter()
            .map(|(name, members)| (name.clone(), members.iter().cloned().collect()))
            .collect()
    }
}

fn members_except(
    rooms: &HashMap<String, HashSet<String>>,
    name: &str,
    id: &str,
) -> Vec<String> {
    rooms
        .get(name)
        .map(|m| m.iter().filter(|m| m.as_str() != id).cloned().collect())
        .unwrap_or_default()
}

fn remove_member(
    rooms: &mut HashMap<String, HashSet<String>>,
    name: &str,
    id: &str,
) -> Vec<String> {
    let Some(members) = rooms.get_mut(name) else {
        return Vec::new();
    };
    members.remove(id);
    if members.is_empty() {
        rooms.remove(name);
        Vec::new()
    } else {
        members.iter().cloned().collect()
    }
}
